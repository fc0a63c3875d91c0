use crate::config::Config;
use crate::engine::EngineHandle;
use crate::pipeline::StreamController;
use argus_hw::Buzzer;
use std::sync::Arc;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: EngineHandle,
    pub stream: Arc<StreamController>,
    /// Present only on hosts where the GPIO chip exists and the line could
    /// be requested.
    pub buzzer: Option<Arc<Buzzer>>,
    pub http: reqwest::Client,
}
