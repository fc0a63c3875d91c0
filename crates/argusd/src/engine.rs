//! Recognition engine actor.
//!
//! A dedicated OS thread owns the ONNX locator, the embedder and the face
//! store; HTTP handlers and the stream pipeline talk to it over a channel.
//! Single-threaded ownership is what serializes enrollment writes against
//! recognition reads.

use argus_core::detector::DetectorError;
use argus_core::embedder::EmbedderError;
use argus_core::{
    primary_face, BoundingBox, FaceEmbedder, FaceLocator, FaceStore, MatchResult, Matcher,
    NearestMatcher, StoreError,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder error: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One labeled detection in a frame.
#[derive(Debug, Clone)]
pub struct FaceHit {
    pub bbox: BoundingBox,
    pub result: MatchResult,
}

/// Result of a successful enrollment.
#[derive(Debug, Clone)]
pub struct EnrollOutcome {
    pub label: String,
    /// Total faces the locator found in the image; the largest was enrolled.
    pub faces_found: usize,
    pub face: BoundingBox,
}

enum EngineRequest {
    Enroll {
        label: String,
        rgb: Vec<u8>,
        width: u32,
        height: u32,
        reply: oneshot::Sender<Result<EnrollOutcome, EngineError>>,
    },
    Recognize {
        rgb: Vec<u8>,
        width: u32,
        height: u32,
        reply: oneshot::Sender<Result<Vec<FaceHit>, EngineError>>,
    },
    Labels {
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll a face from a decoded RGB image: locate, pick the largest
    /// face, embed, persist.
    pub async fn enroll(
        &self,
        label: String,
        rgb: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<EnrollOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                label,
                rgb,
                width,
                height,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Locate and label every face in a frame.
    pub async fn recognize(
        &self,
        rgb: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceHit>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                rgb,
                width,
                height,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Blocking variant of [`recognize`](Self::recognize) for the stream
    /// pipeline thread.
    pub fn recognize_blocking(
        &self,
        rgb: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceHit>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .blocking_send(EngineRequest::Recognize {
                rgb,
                width,
                height,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.blocking_recv().map_err(|_| EngineError::ChannelClosed)?
    }

    /// Enrolled labels in insertion order.
    pub async fn labels(&self) -> Result<Vec<String>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Labels { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The locator, embedder and store move onto the thread; the returned
/// handle is the only way to reach them.
pub fn spawn_engine(
    mut locator: Box<dyn FaceLocator + Send>,
    mut embedder: Box<dyn FaceEmbedder + Send>,
    mut store: FaceStore,
    match_threshold: f32,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("argus-engine".into())
        .spawn(move || {
            tracing::info!(faces = store.len(), match_threshold, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        label,
                        rgb,
                        width,
                        height,
                        reply,
                    } => {
                        let result = run_enroll(
                            locator.as_mut(),
                            embedder.as_mut(),
                            &mut store,
                            &label,
                            &rgb,
                            width,
                            height,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Recognize {
                        rgb,
                        width,
                        height,
                        reply,
                    } => {
                        let result = run_recognize(
                            locator.as_mut(),
                            embedder.as_mut(),
                            &store,
                            match_threshold,
                            &rgb,
                            width,
                            height,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Labels { reply } => {
                        let _ = reply.send(store.labels());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

/// Locate faces, enroll the largest one, persist the store.
///
/// Zero detections leave the store untouched. A save failure propagates;
/// the in-memory entry is already updated at that point, matching the
/// whole-file-rewrite persistence model.
fn run_enroll(
    locator: &mut dyn FaceLocator,
    embedder: &mut dyn FaceEmbedder,
    store: &mut FaceStore,
    label: &str,
    rgb: &[u8],
    width: u32,
    height: u32,
) -> Result<EnrollOutcome, EngineError> {
    let faces = locator.locate(rgb, width, height)?;

    let Some(face) = primary_face(&faces).cloned() else {
        tracing::info!(label, "enroll: no face detected");
        return Err(EngineError::NoFaceDetected);
    };

    let embedding = embedder.embed(rgb, width, height, &face)?;
    store.insert(label, embedding)?;
    store.save()?;

    tracing::info!(
        label,
        faces_found = faces.len(),
        confidence = face.confidence,
        "enroll: face stored"
    );

    Ok(EnrollOutcome {
        label: label.to_string(),
        faces_found: faces.len(),
        face,
    })
}

/// Locate all faces in a frame and label each against the gallery.
///
/// Zero faces is not an error here; the frame just carries no hits. A
/// face whose crop falls outside the frame is skipped, not fatal.
fn run_recognize(
    locator: &mut dyn FaceLocator,
    embedder: &mut dyn FaceEmbedder,
    store: &FaceStore,
    threshold: f32,
    rgb: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<FaceHit>, EngineError> {
    let faces = locator.locate(rgb, width, height)?;
    let mut hits = Vec::with_capacity(faces.len());

    for face in faces {
        let embedding = match embedder.embed(rgb, width, height, &face) {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "recognize: embedding failed, skipping face");
                continue;
            }
        };
        let result = NearestMatcher.best_match(&embedding, store.entries(), threshold);
        hits.push(FaceHit { bbox: face, result });
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{Embedding, FaceStore};

    /// Locator that returns a fixed set of boxes.
    struct StubLocator(Vec<BoundingBox>);

    impl FaceLocator for StubLocator {
        fn locate(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    /// Embedder that encodes the frame's first pixel value, so tests can
    /// steer distances.
    struct StubEmbedder;

    impl FaceEmbedder for StubEmbedder {
        fn embed(
            &mut self,
            rgb: &[u8],
            _width: u32,
            _height: u32,
            _face: &BoundingBox,
        ) -> Result<Embedding, EmbedderError> {
            Ok(Embedding::new(vec![rgb[0] as f32, 0.0]))
        }

        fn dim(&self) -> usize {
            2
        }
    }

    fn bbox(w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width: w,
            height: h,
            confidence: 0.9,
        }
    }

    fn temp_store(tag: &str) -> FaceStore {
        FaceStore::empty(std::env::temp_dir().join(format!(
            "argus-engine-{tag}-{}-{:?}.json",
            std::process::id(),
            std::thread::current().id()
        )))
    }

    fn spawn_test_engine(faces: Vec<BoundingBox>, tag: &str) -> EngineHandle {
        spawn_engine(
            Box::new(StubLocator(faces)),
            Box::new(StubEmbedder),
            temp_store(tag),
            0.7,
        )
    }

    #[tokio::test]
    async fn test_enroll_then_recognize_same_image() {
        let engine = spawn_test_engine(vec![bbox(100.0, 100.0)], "roundtrip");
        let img = vec![42u8; 3 * 4];

        let outcome = engine
            .enroll("alice".to_string(), img.clone(), 2, 2)
            .await
            .unwrap();
        assert_eq!(outcome.label, "alice");
        assert_eq!(outcome.faces_found, 1);

        let hits = engine.recognize(img, 2, 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].result.label.as_deref(), Some("alice"));
        assert_eq!(hits[0].result.distance, 0.0);
    }

    #[tokio::test]
    async fn test_enroll_no_face_leaves_store_unchanged() {
        let engine = spawn_test_engine(vec![], "noface");
        let err = engine
            .enroll("alice".to_string(), vec![0u8; 12], 2, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoFaceDetected));
        assert!(engine.labels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recognize_empty_store_is_unknown() {
        let engine = spawn_test_engine(vec![bbox(50.0, 50.0)], "unknown");
        let hits = engine.recognize(vec![7u8; 12], 2, 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(!hits[0].result.is_match());
        assert_eq!(hits[0].result.label_or_unknown(), "Unknown");
    }

    #[tokio::test]
    async fn test_recognize_beyond_threshold_is_unknown() {
        let engine = spawn_test_engine(vec![bbox(50.0, 50.0)], "threshold");
        engine
            .enroll("alice".to_string(), vec![0u8; 12], 2, 2)
            .await
            .unwrap();
        // First pixel 200 puts the probe 200.0 away from alice's 0.0.
        let hits = engine.recognize(vec![200u8; 12], 2, 2).await.unwrap();
        assert!(!hits[0].result.is_match());
        assert!(hits[0].result.distance.is_infinite());
    }

    #[tokio::test]
    async fn test_enroll_picks_largest_face() {
        let engine = spawn_test_engine(
            vec![bbox(20.0, 20.0), bbox(120.0, 120.0)],
            "largest",
        );
        let outcome = engine
            .enroll("bob".to_string(), vec![1u8; 12], 2, 2)
            .await
            .unwrap();
        assert_eq!(outcome.faces_found, 2);
        assert_eq!(outcome.face.width, 120.0);
    }

    #[tokio::test]
    async fn test_reenroll_does_not_grow_labels() {
        let engine = spawn_test_engine(vec![bbox(50.0, 50.0)], "reenroll");
        engine
            .enroll("alice".to_string(), vec![10u8; 12], 2, 2)
            .await
            .unwrap();
        engine
            .enroll("alice".to_string(), vec![20u8; 12], 2, 2)
            .await
            .unwrap();
        assert_eq!(engine.labels().await.unwrap(), vec!["alice".to_string()]);
    }
}
