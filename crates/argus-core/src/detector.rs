//! UltraFace-style face locator via ONNX Runtime.
//!
//! The model consumes a 320×240 RGB tensor and emits per-anchor
//! (background, face) scores plus normalized corner boxes; decoding is
//! confidence filtering, NMS, and a minimum-face-size cut.

use crate::imageops;
use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ULTRAFACE_INPUT_WIDTH: usize = 320;
const ULTRAFACE_INPUT_HEIGHT: usize = 240;
const ULTRAFACE_MEAN: f32 = 127.0;
const ULTRAFACE_STD: f32 = 128.0;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (place an UltraFace RFB-320 export in the model dir)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detection tuning knobs.
///
/// These are deployment configuration, not validated thresholds: the
/// defaults were tuned against the reference embedding model and do not
/// necessarily generalize to other detector exports.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum face-class score for a candidate to survive decoding.
    pub confidence_threshold: f32,
    /// IoU above which overlapping candidates are suppressed.
    pub nms_threshold: f32,
    /// Detections smaller than this (either side, pixels) are discarded.
    pub min_face_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            nms_threshold: 0.3,
            min_face_size: 30,
        }
    }
}

/// Finds faces in an RGB frame.
pub trait FaceLocator {
    fn locate(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// UltraFace-based face locator.
pub struct OnnxFaceLocator {
    session: Session,
    config: DetectorConfig,
    /// (scores, boxes) output tensor positions, discovered by name at load
    /// time with a positional fallback.
    output_indices: (usize, usize),
}

impl OnnxFaceLocator {
    /// Load the detector ONNX model from the given path.
    pub fn load(model_path: &str, config: DetectorConfig) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face detector model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        let output_indices = discover_output_indices(&output_names);
        tracing::debug!(?output_indices, "detector output tensor mapping");

        Ok(Self {
            session,
            config,
            output_indices,
        })
    }

    /// Preprocess an RGB frame into the NCHW input tensor.
    fn preprocess(rgb: &[u8], width: usize, height: usize) -> Array4<f32> {
        let resized = imageops::resize_rgb_bilinear(
            rgb,
            width,
            height,
            ULTRAFACE_INPUT_WIDTH,
            ULTRAFACE_INPUT_HEIGHT,
        );

        let mut tensor =
            Array4::<f32>::zeros((1, 3, ULTRAFACE_INPUT_HEIGHT, ULTRAFACE_INPUT_WIDTH));
        for y in 0..ULTRAFACE_INPUT_HEIGHT {
            for x in 0..ULTRAFACE_INPUT_WIDTH {
                let base = (y * ULTRAFACE_INPUT_WIDTH + x) * 3;
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (resized[base + c] as f32 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
                }
            }
        }
        tensor
    }
}

impl FaceLocator for OnnxFaceLocator {
    /// Detect faces, returning boxes in source-frame pixels sorted by
    /// confidence.
    fn locate(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let input = Self::preprocess(rgb, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (score_idx, box_idx) = self.output_indices;
        let (_, scores) = outputs[score_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[box_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let candidates = decode_detections(
            scores,
            boxes,
            width as f32,
            height as f32,
            self.config.confidence_threshold,
        );

        let min_side = self.config.min_face_size as f32;
        let mut result: Vec<BoundingBox> = nms(candidates, self.config.nms_threshold)
            .into_iter()
            .filter(|b| b.width >= min_side && b.height >= min_side)
            .collect();

        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(result)
    }
}

/// Discover the (scores, boxes) output positions by name.
///
/// UltraFace exports name the tensors "scores" and "boxes"; generic exports
/// fall back to positional ordering [0]=scores, [1]=boxes.
fn discover_output_indices(names: &[String]) -> (usize, usize) {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");

    match (scores, boxes) {
        (Some(s), Some(b)) => {
            tracing::info!("detector: using name-based output tensor mapping");
            (s, b)
        }
        _ => {
            tracing::info!(
                ?names,
                "detector: output names not recognized, using positional mapping [0]=scores, [1]=boxes"
            );
            (0, 1)
        }
    }
}

/// Decode raw score/box tensors into frame-space candidates.
///
/// `scores` is [N, 2] (background, face) and `boxes` is [N, 4] normalized
/// corner coordinates, flattened.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    frame_w: f32,
    frame_h: f32,
    threshold: f32,
) -> Vec<BoundingBox> {
    let num_anchors = scores.len() / 2;
    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let confidence = scores[idx * 2 + 1];
        if confidence <= threshold {
            continue;
        }

        let box_off = idx * 4;
        if box_off + 3 >= boxes.len() {
            continue;
        }

        let x1 = (boxes[box_off] * frame_w).clamp(0.0, frame_w);
        let y1 = (boxes[box_off + 1] * frame_h).clamp(0.0, frame_h);
        let x2 = (boxes[box_off + 2] * frame_w).clamp(0.0, frame_w);
        let y2 = (boxes[box_off + 3] * frame_h).clamp(0.0, frame_h);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let union_area = a.area() + b.area() - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        let expected = 50.0 / 150.0;
        assert!((iou(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.3);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.3).is_empty());
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        // Two anchors: one background-dominant, one confident face.
        let scores = [0.9, 0.1, 0.1, 0.9];
        let boxes = [0.0, 0.0, 0.5, 0.5, 0.25, 0.25, 0.75, 0.75];
        let dets = decode_detections(&scores, &boxes, 640.0, 480.0, 0.7);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert!((d.x - 160.0).abs() < 1e-3);
        assert!((d.y - 120.0).abs() < 1e-3);
        assert!((d.width - 320.0).abs() < 1e-3);
        assert!((d.height - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_degenerate_boxes() {
        let scores = [0.1, 0.9];
        // x2 <= x1: inverted box must be dropped.
        let boxes = [0.8, 0.2, 0.2, 0.8];
        assert!(decode_detections(&scores, &boxes, 640.0, 480.0, 0.5).is_empty());
    }

    #[test]
    fn test_decode_clamps_to_frame() {
        let scores = [0.1, 0.95];
        let boxes = [-0.2, -0.2, 0.5, 0.5];
        let dets = decode_detections(&scores, &boxes, 100.0, 100.0, 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x, 0.0);
        assert_eq!(dets[0].y, 0.0);
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = ["boxes", "scores"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (1, 0));
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = ["428", "429"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (0, 1));
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let rgb = vec![127u8; 64 * 48 * 3];
        let tensor = OnnxFaceLocator::preprocess(&rgb, 64, 48);
        assert_eq!(
            tensor.shape(),
            &[1, 3, ULTRAFACE_INPUT_HEIGHT, ULTRAFACE_INPUT_WIDTH]
        );
        // Pixel value 127 normalizes to 0.0 exactly.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 2, 120, 160]], 0.0);
    }
}
