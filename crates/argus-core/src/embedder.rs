//! FaceNet-style face embedder via ONNX Runtime.
//!
//! Crops a detected face from the color frame, resizes to 160×160 and
//! extracts a 128-dimensional embedding.

use crate::imageops;
use crate::types::{BoundingBox, Embedding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACENET_INPUT_SIZE: usize = 160;
const FACENET_MEAN: f32 = 127.5;
const FACENET_STD: f32 = 128.0;

/// Embedding dimensionality of the reference model.
pub const EMBEDDING_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} (place a FaceNet export in the model dir)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region lies outside the frame")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Turns a face crop into a fixed-length embedding.
pub trait FaceEmbedder {
    fn embed(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Embedding, EmbedderError>;

    /// Dimensionality of the embeddings this embedder produces.
    fn dim(&self) -> usize;
}

/// FaceNet-based embedder.
pub struct OnnxEmbedder {
    session: Session,
}

impl OnnxEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face embedding model"
        );

        Ok(Self { session })
    }

    /// Preprocess a 160×160 RGB face crop into the NCHW input tensor.
    fn preprocess(crop: &[u8]) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size {
            for x in 0..size {
                let base = (y * size + x) * 3;
                for c in 0..3 {
                    let pixel = crop.get(base + c).copied().unwrap_or(0) as f32;
                    tensor[[0, c, y, x]] = (pixel - FACENET_MEAN) / FACENET_STD;
                }
            }
        }

        tensor
    }
}

impl FaceEmbedder for OnnxEmbedder {
    fn embed(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Embedding, EmbedderError> {
        let (crop, crop_w, crop_h) =
            imageops::crop_rgb(rgb, width as usize, height as usize, face)
                .ok_or(EmbedderError::EmptyCrop)?;

        let resized = imageops::resize_rgb_bilinear(
            &crop,
            crop_w,
            crop_h,
            FACENET_INPUT_SIZE,
            FACENET_INPUT_SIZE,
        );

        let input = Self::preprocess(&resized);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let values: Vec<f32> = raw_data.to_vec();

        if values.len() != EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                values.len()
            )));
        }

        // Raw model output, no L2 normalization: the Euclidean match
        // threshold is calibrated against unnormalized FaceNet embeddings.
        Ok(Embedding::new(values))
    }

    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_output_shape() {
        let crop = vec![128u8; FACENET_INPUT_SIZE * FACENET_INPUT_SIZE * 3];
        let tensor = OnnxEmbedder::preprocess(&crop);
        assert_eq!(
            tensor.shape(),
            &[1, 3, FACENET_INPUT_SIZE, FACENET_INPUT_SIZE]
        );
    }

    #[test]
    fn test_preprocess_normalization() {
        let crop = vec![128u8; FACENET_INPUT_SIZE * FACENET_INPUT_SIZE * 3];
        let tensor = OnnxEmbedder::preprocess(&crop);
        let expected = (128.0 - FACENET_MEAN) / FACENET_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_channel_order() {
        // First pixel R=10, G=20, B=30 must land in channels 0, 1, 2.
        let mut crop = vec![0u8; FACENET_INPUT_SIZE * FACENET_INPUT_SIZE * 3];
        crop[0] = 10;
        crop[1] = 20;
        crop[2] = 30;
        let tensor = OnnxEmbedder::preprocess(&crop);
        assert!((tensor[[0, 0, 0, 0]] - (10.0 - FACENET_MEAN) / FACENET_STD).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - (20.0 - FACENET_MEAN) / FACENET_STD).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - (30.0 - FACENET_MEAN) / FACENET_STD).abs() < 1e-6);
    }
}
