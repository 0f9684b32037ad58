//! Per-frame processing: detect faces, match each against the gallery.

use mien_core::{AnalyzerError, FaceAnalyzer, Gallery, MatchError, Matcher, NearestMatcher, OverlayFace};
use mien_hw::Frame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("face analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("gallery match failed: {0}")]
    Match(#[from] MatchError),
}

/// Turns one camera frame into overlay records, one per detected face.
///
/// Every frame is processed from scratch; nothing is tracked or smoothed
/// across frames.
pub struct FrameProcessor {
    analyzer: Box<dyn FaceAnalyzer>,
    gallery: Gallery,
    matcher: NearestMatcher,
    tolerance: f32,
}

impl FrameProcessor {
    pub fn new(analyzer: Box<dyn FaceAnalyzer>, gallery: Gallery, tolerance: f32) -> Self {
        Self {
            analyzer,
            gallery,
            matcher: NearestMatcher,
            tolerance,
        }
    }

    /// One overlay per detected face, in detection order.
    pub fn process(&mut self, frame: &Frame) -> Result<Vec<OverlayFace>, PipelineError> {
        let faces = self
            .analyzer
            .analyze(&frame.data, frame.width, frame.height)?;

        let mut overlays = Vec::with_capacity(faces.len());
        for face in faces {
            let result =
                self.matcher
                    .classify(&face.embedding, self.gallery.entries(), self.tolerance)?;
            overlays.push(OverlayFace {
                bbox: face.bbox,
                label: result.label,
                confidence: result.confidence,
            });
        }

        Ok(overlays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mien_core::{BoundingBox, DetectedFace, Embedding, GalleryEntry, UNKNOWN_LABEL};
    use std::time::Instant;

    struct ScriptedAnalyzer {
        faces: Vec<DetectedFace>,
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn analyze(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<DetectedFace>, AnalyzerError> {
            Ok(self.faces.clone())
        }
    }

    struct FailingAnalyzer;

    impl FaceAnalyzer for FailingAnalyzer {
        fn analyze(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<DetectedFace>, AnalyzerError> {
            Err(AnalyzerError::FrameTooSmall {
                expected: 100,
                actual: 0,
            })
        }
    }

    fn frame() -> Frame {
        Frame {
            data: vec![0u8; 2 * 2 * 3],
            width: 2,
            height: 2,
            timestamp: Instant::now(),
            sequence: 0,
        }
    }

    fn face(x: f32, values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox {
                x,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
                landmarks: None,
            },
            embedding: Embedding::new(values),
        }
    }

    fn entry(label: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            label: label.to_string(),
            embedding: Embedding::new(values),
        }
    }

    fn processor(faces: Vec<DetectedFace>, entries: Vec<GalleryEntry>) -> FrameProcessor {
        FrameProcessor::new(
            Box::new(ScriptedAnalyzer { faces }),
            Gallery::from_entries(entries),
            0.8,
        )
    }

    #[test]
    fn test_no_faces_yields_no_overlays() {
        let mut p = processor(vec![], vec![entry("alice", vec![0.0, 0.0])]);
        let overlays = p.process(&frame()).unwrap();
        assert!(overlays.is_empty());
    }

    #[test]
    fn test_one_overlay_per_face_in_detection_order() {
        let faces = vec![
            face(10.0, vec![0.0, 0.0]),
            face(50.0, vec![9.0, 9.0]),
            face(90.0, vec![0.1, 0.0]),
        ];
        let mut p = processor(faces, vec![entry("alice", vec![0.0, 0.0])]);
        let overlays = p.process(&frame()).unwrap();

        assert_eq!(overlays.len(), 3);
        assert_eq!(overlays[0].bbox.x, 10.0);
        assert_eq!(overlays[1].bbox.x, 50.0);
        assert_eq!(overlays[2].bbox.x, 90.0);
        assert_eq!(overlays[0].label, "alice");
        assert_eq!(overlays[1].label, UNKNOWN_LABEL);
        assert_eq!(overlays[2].label, "alice");
    }

    #[test]
    fn test_exact_match_confidence() {
        let mut p = processor(
            vec![face(0.0, vec![1.0, 2.0])],
            vec![entry("bob", vec![1.0, 2.0])],
        );
        let overlays = p.process(&frame()).unwrap();
        assert_eq!(overlays[0].label, "bob");
        assert_eq!(overlays[0].confidence, 1.0);
    }

    #[test]
    fn test_empty_gallery_labels_everything_unknown() {
        let mut p = processor(vec![face(0.0, vec![1.0, 2.0])], vec![]);
        let overlays = p.process(&frame()).unwrap();
        assert_eq!(overlays[0].label, UNKNOWN_LABEL);
        assert_eq!(overlays[0].confidence, 0.0);
    }

    #[test]
    fn test_analyzer_error_propagates() {
        let mut p = FrameProcessor::new(
            Box::new(FailingAnalyzer),
            Gallery::from_entries(vec![]),
            0.8,
        );
        assert!(matches!(
            p.process(&frame()),
            Err(PipelineError::Analyzer(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let mut p = processor(
            vec![face(0.0, vec![1.0, 2.0, 3.0])],
            vec![entry("alice", vec![1.0, 2.0])],
        );
        assert!(matches!(p.process(&frame()), Err(PipelineError::Match(_))));
    }

    #[test]
    fn test_process_is_stateless_across_frames() {
        let mut p = processor(
            vec![face(0.0, vec![0.3, 0.0])],
            vec![entry("alice", vec![0.0, 0.0])],
        );
        let first = p.process(&frame()).unwrap();
        let second = p.process(&frame()).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].label, second[0].label);
        assert_eq!(first[0].confidence, second[0].confidence);
    }
}
