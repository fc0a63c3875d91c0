//! argusd: face-recognition camera daemon.

mod config;
mod draw;
mod engine;
mod error;
mod http;
mod pipeline;
mod source;
mod state;

use anyhow::Context;
use argus_core::{DetectorConfig, FaceStore, OnnxEmbedder, OnnxFaceLocator};
use argus_hw::Buzzer;
use config::Config;
use pipeline::StreamController;
use state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();

    let store = FaceStore::load(&config.store_path)
        .with_context(|| format!("failed to load face store from {:?}", config.store_path))?;
    tracing::info!(faces = store.len(), path = ?config.store_path, "face store loaded");

    let locator = OnnxFaceLocator::load(
        &config.detector_model_path(),
        DetectorConfig {
            confidence_threshold: config.detector_confidence,
            nms_threshold: config.detector_nms,
            min_face_size: config.min_face_size,
        },
    )
    .context("failed to load face detection model")?;

    let embedder = OnnxEmbedder::load(&config.embedder_model_path())
        .context("failed to load face embedding model")?;

    let engine = engine::spawn_engine(
        Box::new(locator),
        Box::new(embedder),
        store,
        config.match_threshold,
    );

    let buzzer = match Buzzer::probe(&config.buzzer_chip, config.buzzer_line) {
        Some(Ok(b)) => Some(Arc::new(b)),
        Some(Err(err)) => {
            tracing::warn!(error = %err, chip = %config.buzzer_chip, "buzzer unavailable");
            None
        }
        None => {
            tracing::info!(chip = %config.buzzer_chip, "no GPIO chip, buzzer disabled");
            None
        }
    };

    let addr = config.socket_addr().context("invalid bind address")?;
    let state = AppState {
        config: Arc::new(config),
        engine,
        stream: Arc::new(StreamController::new()),
        buzzer,
        http: reqwest::Client::new(),
    };

    let app = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "argusd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("argusd shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
