/// Axis-aligned bounding box for a detected face, in source-frame pixels.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (128-dimensional for the reference FaceNet model).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another embedding.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Result of matching a probe embedding against the enrolled gallery.
///
/// `label` is `None` when nothing cleared the distance threshold; the
/// distance is then the infinity sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: Option<String>,
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown() -> Self {
        Self {
            label: None,
            distance: f32::INFINITY,
        }
    }

    /// Label for display, with the Unknown sentinel spelled out.
    pub fn label_or_unknown(&self) -> &str {
        self.label.as_deref().unwrap_or("Unknown")
    }

    pub fn is_match(&self) -> bool {
        self.label.is_some()
    }
}

/// Strategy for labeling a probe embedding against an ordered gallery.
pub trait Matcher {
    fn best_match(
        &self,
        probe: &Embedding,
        gallery: &[(String, Embedding)],
        threshold: f32,
    ) -> MatchResult;
}

/// Euclidean nearest-neighbor matcher.
///
/// A candidate only replaces the running best when its distance is strictly
/// below both the threshold and the current minimum, so on an exact tie the
/// entry that was inserted first wins. Iteration follows gallery order.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn best_match(
        &self,
        probe: &Embedding,
        gallery: &[(String, Embedding)],
        threshold: f32,
    ) -> MatchResult {
        let mut best = MatchResult::unknown();

        for (label, enrolled) in gallery {
            let dist = probe.euclidean_distance(enrolled);
            if dist < threshold && dist < best.distance {
                best = MatchResult {
                    label: Some(label.clone()),
                    distance: dist,
                };
            }
        }

        best
    }
}

/// Pick the face to enroll when an image contains several.
///
/// Policy: largest bounding box wins; the first detection wins on equal
/// area. This replaces detector-order-dependent "first hit" selection.
pub fn primary_face(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    let mut best: Option<&BoundingBox> = None;
    for face in faces {
        match best {
            Some(b) if face.area() <= b.area() => {}
            _ => best = Some(face),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = emb(&[1.0, 2.0, 3.0]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_axis() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_match_empty_gallery_is_unknown() {
        let result = NearestMatcher.best_match(&emb(&[1.0, 0.0]), &[], 0.7);
        assert!(!result.is_match());
        assert_eq!(result.label_or_unknown(), "Unknown");
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_match_identical_embedding_distance_zero() {
        let gallery = vec![("alice".to_string(), emb(&[0.1, 0.2, 0.3]))];
        let result = NearestMatcher.best_match(&emb(&[0.1, 0.2, 0.3]), &gallery, 0.7);
        assert_eq!(result.label.as_deref(), Some("alice"));
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn test_match_above_threshold_is_unknown() {
        // Distance 0.9 against a 0.7 threshold must not match.
        let gallery = vec![("alice".to_string(), emb(&[0.0, 0.0]))];
        let result = NearestMatcher.best_match(&emb(&[0.9, 0.0]), &gallery, 0.7);
        assert!(!result.is_match());
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_match_picks_nearest() {
        let gallery = vec![
            ("far".to_string(), emb(&[0.5, 0.0])),
            ("near".to_string(), emb(&[0.1, 0.0])),
        ];
        let result = NearestMatcher.best_match(&emb(&[0.0, 0.0]), &gallery, 0.7);
        assert_eq!(result.label.as_deref(), Some("near"));
        assert!((result.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_match_tie_first_inserted_wins() {
        // Two entries equidistant from the probe, both below threshold.
        let gallery = vec![
            ("first".to_string(), emb(&[0.2, 0.0])),
            ("second".to_string(), emb(&[-0.2, 0.0])),
        ];
        let result = NearestMatcher.best_match(&emb(&[0.0, 0.0]), &gallery, 0.7);
        assert_eq!(result.label.as_deref(), Some("first"));
    }

    #[test]
    fn test_match_deterministic() {
        let gallery = vec![
            ("a".to_string(), emb(&[0.3, 0.1])),
            ("b".to_string(), emb(&[0.1, 0.3])),
        ];
        let probe = emb(&[0.15, 0.15]);
        let first = NearestMatcher.best_match(&probe, &gallery, 0.7);
        for _ in 0..10 {
            assert_eq!(NearestMatcher.best_match(&probe, &gallery, 0.7), first);
        }
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_primary_face_largest_wins() {
        let faces = vec![bbox(0.0, 0.0, 10.0, 10.0), bbox(50.0, 50.0, 40.0, 40.0)];
        let face = primary_face(&faces).unwrap();
        assert_eq!(face.x, 50.0);
    }

    #[test]
    fn test_primary_face_tie_first_wins() {
        let faces = vec![bbox(0.0, 0.0, 20.0, 20.0), bbox(90.0, 0.0, 20.0, 20.0)];
        let face = primary_face(&faces).unwrap();
        assert_eq!(face.x, 0.0);
    }

    #[test]
    fn test_primary_face_empty() {
        assert!(primary_face(&[]).is_none());
    }
}
