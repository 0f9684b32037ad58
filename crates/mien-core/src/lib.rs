//! Face detection, embedding extraction, and gallery matching.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime for CPU inference. Matching is a plain
//! nearest-neighbor scan over Euclidean distance.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod gallery;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use analyzer::OnnxFaceAnalyzer;
pub use gallery::Gallery;
pub use matcher::{MatchError, Matcher, NearestMatcher};
pub use types::{
    AnalyzerError, BoundingBox, DetectedFace, Embedding, FaceAnalyzer, GalleryEntry, MatchResult,
    OverlayFace, UNKNOWN_LABEL,
};
