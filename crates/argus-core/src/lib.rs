//! Face localization, embedding and recognition.
//!
//! Uses an UltraFace-style detector for face localization and a
//! FaceNet-style embedder for 128-dimensional face embeddings, both
//! running via ONNX Runtime for CPU inference. Recognition is a linear
//! nearest-neighbor scan over the enrolled gallery.

pub mod detector;
pub mod embedder;
pub mod imageops;
pub mod store;
pub mod types;

pub use detector::{DetectorConfig, FaceLocator, OnnxFaceLocator};
pub use embedder::{FaceEmbedder, OnnxEmbedder, EMBEDDING_DIM};
pub use store::{FaceStore, StoreError};
pub use types::{primary_face, BoundingBox, Embedding, MatchResult, Matcher, NearestMatcher};
