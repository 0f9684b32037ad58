//! ONNX-backed face analyzer: SCRFD detection composed with ArcFace embedding.

use crate::detector::FaceDetector;
use crate::recognizer::FaceRecognizer;
use crate::types::{AnalyzerError, DetectedFace, FaceAnalyzer};
use std::path::Path;

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Face analyzer backed by the insightface buffalo_l model pair.
///
/// Owns both ONNX sessions; `analyze` runs detection over the full frame and
/// embedding extraction per detected face.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceAnalyzer {
    /// Load both models from `model_dir`.
    ///
    /// Expects `det_10g.onnx` and `w600k_r50.onnx` inside the directory.
    /// `detector_input_size` is the square SCRFD input edge (multiple of 32).
    pub fn load(model_dir: &Path, detector_input_size: usize) -> Result<Self, AnalyzerError> {
        let detector_path = model_dir.join(DETECTOR_MODEL_FILE);
        let recognizer_path = model_dir.join(RECOGNIZER_MODEL_FILE);

        let detector =
            FaceDetector::load(&detector_path.to_string_lossy(), detector_input_size)?;
        let recognizer = FaceRecognizer::load(&recognizer_path.to_string_lossy())?;

        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(AnalyzerError::FrameTooSmall {
                expected,
                actual: rgb.len(),
            });
        }

        let boxes = self.detector.detect(rgb, width, height)?;
        tracing::debug!(faces = boxes.len(), width, height, "detection pass");

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match self.recognizer.extract(rgb, width, height, &bbox) {
                Ok(embedding) => faces.push(DetectedFace { bbox, embedding }),
                Err(err) => {
                    // Keep the remaining faces; one bad crop must not sink the frame.
                    tracing::warn!(
                        error = %err,
                        confidence = bbox.confidence,
                        "embedding extraction failed for a detected face, skipping it"
                    );
                }
            }
        }

        Ok(faces)
    }
}
