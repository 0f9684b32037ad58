use serde::{Deserialize, Serialize};

use crate::detector::DetectorError;
use crate::recognizer::RecognizerError;

/// Label reported for faces that match no gallery entry.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box for a detected face, in source frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance to another embedding.
    ///
    /// Callers must ensure both embeddings have the same dimensionality;
    /// mismatched tails are ignored by the pairwise zip.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A face found in a frame: where it is, plus its embedding.
///
/// Produced per frame and consumed immediately; never persisted.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// One reference embedding in the gallery. Labels repeat when a person
/// has several reference images.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
}

/// Result of classifying a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Matched person label, or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Confidence in [0, 1]; 0.0 for unknown faces.
    pub confidence: f32,
}

impl MatchResult {
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_known(&self) -> bool {
        self.label != UNKNOWN_LABEL
    }
}

/// Everything the view needs to draw one face.
#[derive(Debug, Clone)]
pub struct OverlayFace {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f32,
}

#[derive(thiserror::Error, Debug)]
pub enum AnalyzerError {
    #[error("frame buffer too small: expected {expected} bytes, got {actual}")]
    FrameTooSmall { expected: usize, actual: usize },
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detection plus embedding extraction as a single capability.
///
/// Takes a packed RGB24 frame and returns every fully analyzed face in
/// detection order. Implementations report only faces for which an
/// embedding could be extracted.
pub trait FaceAnalyzer {
    fn analyze(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, AnalyzerError>;
}
