//! Stream lifecycle and the recognition worker loop.
//!
//! At most one stream session exists at a time. The worker runs on its own
//! OS thread, pulls frames from a [`FrameSource`], runs recognition through
//! the engine, and publishes annotated JPEGs through a [`FrameSink`]. Each
//! `/video_feed` viewer gets a fresh single-frame channel whose sender is
//! swapped into the sink, so a disconnected viewer can reconnect without
//! restarting the stream. When the viewer is slow the worker drops frames
//! instead of backing up, so stop requests always take effect within one
//! frame.

use crate::draw;
use crate::engine::EngineHandle;
use crate::source::FrameSource;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream already running")]
    AlreadyRunning,
    #[error("stream is not running")]
    NotRunning,
}

/// Worker-side frame outlet. Holds the sender for whichever viewer is
/// currently attached; `connect` replaces it when a new viewer arrives.
#[derive(Clone)]
pub struct FrameSink {
    sender: Arc<Mutex<mpsc::Sender<Vec<u8>>>>,
}

impl FrameSink {
    fn new() -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                sender: Arc::new(Mutex::new(tx)),
            },
            rx,
        )
    }

    /// Attach a new viewer, detaching any previous one.
    fn connect(&self) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(1);
        *self.sender.lock().unwrap() = tx;
        rx
    }

    /// Offer a frame to the attached viewer. A full channel drops the
    /// frame; a closed one means the viewer left, which is not an error.
    pub fn offer(&self, frame: Vec<u8>) {
        let _ = self.sender.lock().unwrap().try_send(frame);
    }
}

struct Session {
    id: u64,
    stop: Arc<AtomicBool>,
    sink: FrameSink,
}

struct Inner {
    session: Option<Session>,
    next_id: u64,
}

/// Owns the start/stop state machine for the single video stream.
pub struct StreamController {
    inner: Mutex<Inner>,
}

impl StreamController {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                session: None,
                next_id: 0,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().session.is_some()
    }

    /// Start a session, handing the worker closure a stop flag and the
    /// frame sink. The worker runs on a fresh thread; when it returns the
    /// session is cleared (unless a newer one replaced it).
    pub fn start_with(
        self: Arc<Self>,
        worker: impl FnOnce(Arc<AtomicBool>, FrameSink) + Send + 'static,
    ) -> Result<(), StreamError> {
        let (id, stop, sink) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.session.is_some() {
                return Err(StreamError::AlreadyRunning);
            }
            let id = inner.next_id;
            inner.next_id += 1;

            let stop = Arc::new(AtomicBool::new(false));
            // The initial receiver is discarded; frames flow once a viewer
            // connects through `take_frames`.
            let (sink, _rx) = FrameSink::new();
            inner.session = Some(Session {
                id,
                stop: stop.clone(),
                sink: sink.clone(),
            });
            (id, stop, sink)
        };

        let controller = Arc::clone(&self);
        std::thread::Builder::new()
            .name("argus-stream".into())
            .spawn(move || {
                worker(stop, sink);
                controller.finish(id);
            })
            .map_err(|e| {
                tracing::error!(error = %e, "failed to spawn stream thread");
                self.inner.lock().unwrap().session = None;
                StreamError::NotRunning
            })?;

        Ok(())
    }

    /// Signal the worker to stop and clear the session immediately.
    pub fn stop(&self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.session.take() {
            Some(session) => {
                session.stop.store(true, Ordering::Relaxed);
                tracing::info!(session = session.id, "stream stopped");
                Ok(())
            }
            None => Err(StreamError::NotRunning),
        }
    }

    /// Attach a viewer to the running session, detaching any previous one.
    /// A viewer that disconnected (browser refresh) can reconnect here as
    /// long as the session is alive.
    pub fn take_frames(&self) -> Result<mpsc::Receiver<Vec<u8>>, StreamError> {
        let inner = self.inner.lock().unwrap();
        let session = inner.session.as_ref().ok_or(StreamError::NotRunning)?;
        Ok(session.sink.connect())
    }

    /// Worker-side cleanup: drop the session when it is still ours.
    fn finish(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.session.as_ref().is_some_and(|s| s.id == id) {
            inner.session = None;
            tracing::info!(session = id, "stream worker finished");
        }
    }
}

impl Default for StreamController {
    fn default() -> Self {
        Self::new()
    }
}

/// The stream worker loop: capture, recognize, annotate, encode, publish.
///
/// Frames the viewer is too slow to take are dropped. A recognition error
/// skips the frame; a source error ends the stream.
pub fn run_stream(
    source: FrameSource,
    engine: EngineHandle,
    stop: Arc<AtomicBool>,
    sink: FrameSink,
    jpeg_quality: u8,
) {
    tracing::info!(source = %source.describe(), "stream worker started");

    let result = source.for_each_frame(|frame| {
        if stop.load(Ordering::Relaxed) {
            return ControlFlow::Break(());
        }

        let hits = match engine.recognize_blocking(frame.data.clone(), frame.width, frame.height)
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, sequence = frame.sequence, "recognition failed, skipping frame");
                return ControlFlow::Continue(());
            }
        };

        let Some(mut image) =
            image::RgbImage::from_raw(frame.width, frame.height, frame.data)
        else {
            tracing::warn!(sequence = frame.sequence, "frame buffer length mismatch");
            return ControlFlow::Continue(());
        };
        draw::annotate(&mut image, &hits);

        let jpeg = match draw::encode_jpeg(&image, jpeg_quality) {
            Ok(j) => j,
            Err(err) => {
                tracing::warn!(error = %err, "JPEG encode failed, skipping frame");
                return ControlFlow::Continue(());
            }
        };

        sink.offer(jpeg);
        ControlFlow::Continue(())
    });

    match result {
        Ok(()) => tracing::info!("stream worker stopped"),
        Err(err) => tracing::error!(error = %err, "stream source failed"),
    }
}
