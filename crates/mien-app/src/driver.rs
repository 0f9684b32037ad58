//! The capture/process/render loop.

use crate::fps::FpsMeter;
use crate::pipeline::{FrameProcessor, PipelineError};
use crate::view::{FrameRenderer, ViewError};
use mien_hw::FrameSource;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("render: {0}")]
    Render(#[from] ViewError),
}

/// Run the session until a quit key, a stop signal, or a fatal error.
///
/// Per iteration: check the stop flag, sample the frame rate, read a frame,
/// process it, render it, then poll for a quit key. A failed read or a failed
/// analysis logs a warning and skips the rest of the iteration; a dimension
/// mismatch or a render failure ends the session. Whatever way the loop ends,
/// the camera is released before the window is closed, each exactly once.
pub fn run(
    camera: &mut dyn FrameSource,
    processor: &mut FrameProcessor,
    renderer: &mut dyn FrameRenderer,
    stop: &AtomicBool,
) -> Result<(), DriverError> {
    let result = run_loop(camera, processor, renderer, stop);

    camera.release();
    renderer.close();

    result
}

fn run_loop(
    camera: &mut dyn FrameSource,
    processor: &mut FrameProcessor,
    renderer: &mut dyn FrameRenderer,
    stop: &AtomicBool,
) -> Result<(), DriverError> {
    let mut fps = FpsMeter::new();
    let mut frames_shown = 0u64;

    loop {
        if stop.load(Ordering::SeqCst) {
            tracing::info!("stop requested, leaving capture loop");
            break;
        }

        let rate = fps.tick();

        let frame = match camera.read() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "frame capture failed, retrying");
                continue;
            }
        };

        // A dimension mismatch means the gallery and the model disagree;
        // only analyzer errors are retried.
        let overlays = match processor.process(&frame) {
            Ok(overlays) => overlays,
            Err(PipelineError::Analyzer(err)) => {
                tracing::warn!(error = %err, "frame analysis failed, skipping frame");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        renderer.show(&frame, &overlays, rate)?;
        frames_shown += 1;

        if renderer.poll_quit()? {
            tracing::info!("quit key pressed");
            break;
        }
    }

    tracing::info!(frames = frames_shown, "capture loop finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mien_core::{
        AnalyzerError, BoundingBox, DetectedFace, Embedding, FaceAnalyzer, Gallery, GalleryEntry,
        OverlayFace,
    };
    use mien_hw::{CameraError, Frame};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Instant;

    type Journal = Rc<RefCell<Vec<&'static str>>>;

    struct StubCamera {
        reads: usize,
        fail_at: Option<usize>,
        journal: Journal,
    }

    impl FrameSource for StubCamera {
        fn read(&mut self) -> Result<Frame, CameraError> {
            self.reads += 1;
            if Some(self.reads) == self.fail_at {
                return Err(CameraError::CaptureFailed("stub read failure".to_string()));
            }
            Ok(Frame {
                data: vec![0u8; 2 * 2 * 3],
                width: 2,
                height: 2,
                timestamp: Instant::now(),
                sequence: self.reads as u32,
            })
        }

        fn release(&mut self) {
            self.journal.borrow_mut().push("release");
        }
    }

    struct StubRenderer {
        shows: usize,
        quit_after_shows: usize,
        journal: Journal,
    }

    impl FrameRenderer for StubRenderer {
        fn show(
            &mut self,
            _frame: &Frame,
            _overlays: &[OverlayFace],
            _fps: f64,
        ) -> Result<(), ViewError> {
            self.shows += 1;
            Ok(())
        }

        fn poll_quit(&mut self) -> Result<bool, ViewError> {
            Ok(self.shows >= self.quit_after_shows)
        }

        fn close(&mut self) {
            self.journal.borrow_mut().push("close");
        }
    }

    struct StubAnalyzer {
        faces: Vec<DetectedFace>,
        calls: usize,
        fail_at: Option<usize>,
    }

    impl FaceAnalyzer for StubAnalyzer {
        fn analyze(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<DetectedFace>, AnalyzerError> {
            self.calls += 1;
            if Some(self.calls) == self.fail_at {
                return Err(AnalyzerError::FrameTooSmall {
                    expected: 12,
                    actual: 0,
                });
            }
            Ok(self.faces.clone())
        }
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
                landmarks: None,
            },
            embedding: Embedding::new(values),
        }
    }

    fn empty_processor() -> FrameProcessor {
        FrameProcessor::new(
            Box::new(StubAnalyzer {
                faces: vec![],
                calls: 0,
                fail_at: None,
            }),
            Gallery::from_entries(vec![]),
            0.8,
        )
    }

    #[test]
    fn test_quit_key_shuts_down_in_order() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut camera = StubCamera {
            reads: 0,
            fail_at: None,
            journal: Rc::clone(&journal),
        };
        let mut renderer = StubRenderer {
            shows: 0,
            quit_after_shows: 3,
            journal: Rc::clone(&journal),
        };
        let mut processor = empty_processor();
        let stop = AtomicBool::new(false);

        run(&mut camera, &mut processor, &mut renderer, &stop).unwrap();

        assert_eq!(renderer.shows, 3);
        assert_eq!(camera.reads, 3);
        assert_eq!(*journal.borrow(), vec!["release", "close"]);
    }

    #[test]
    fn test_read_failure_skips_iteration() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut camera = StubCamera {
            reads: 0,
            fail_at: Some(3),
            journal: Rc::clone(&journal),
        };
        let mut renderer = StubRenderer {
            shows: 0,
            quit_after_shows: 4,
            journal: Rc::clone(&journal),
        };
        let mut processor = empty_processor();
        let stop = AtomicBool::new(false);

        run(&mut camera, &mut processor, &mut renderer, &stop).unwrap();

        // Read 3 failed, so 5 reads were needed for 4 rendered frames.
        assert_eq!(camera.reads, 5);
        assert_eq!(renderer.shows, 4);
        assert_eq!(*journal.borrow(), vec!["release", "close"]);
    }

    #[test]
    fn test_analyzer_failure_skips_iteration() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut camera = StubCamera {
            reads: 0,
            fail_at: None,
            journal: Rc::clone(&journal),
        };
        let mut renderer = StubRenderer {
            shows: 0,
            quit_after_shows: 3,
            journal: Rc::clone(&journal),
        };
        let mut processor = FrameProcessor::new(
            Box::new(StubAnalyzer {
                faces: vec![],
                calls: 0,
                fail_at: Some(2),
            }),
            Gallery::from_entries(vec![]),
            0.8,
        );
        let stop = AtomicBool::new(false);

        run(&mut camera, &mut processor, &mut renderer, &stop).unwrap();

        // Analysis of frame 2 failed, so 4 reads were needed for 3 rendered frames.
        assert_eq!(camera.reads, 4);
        assert_eq!(renderer.shows, 3);
        assert_eq!(*journal.borrow(), vec!["release", "close"]);
    }

    #[test]
    fn test_preset_stop_flag_skips_capture() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut camera = StubCamera {
            reads: 0,
            fail_at: None,
            journal: Rc::clone(&journal),
        };
        let mut renderer = StubRenderer {
            shows: 0,
            quit_after_shows: 1,
            journal: Rc::clone(&journal),
        };
        let mut processor = empty_processor();
        let stop = AtomicBool::new(true);

        run(&mut camera, &mut processor, &mut renderer, &stop).unwrap();

        assert_eq!(camera.reads, 0);
        assert_eq!(renderer.shows, 0);
        assert_eq!(*journal.borrow(), vec!["release", "close"]);
    }

    #[test]
    fn test_fatal_pipeline_error_still_shuts_down() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut camera = StubCamera {
            reads: 0,
            fail_at: None,
            journal: Rc::clone(&journal),
        };
        let mut renderer = StubRenderer {
            shows: 0,
            quit_after_shows: 10,
            journal: Rc::clone(&journal),
        };
        // Probe embeddings are 3-dimensional, the gallery entry is 2-dimensional.
        let mut processor = FrameProcessor::new(
            Box::new(StubAnalyzer {
                faces: vec![face(vec![1.0, 2.0, 3.0])],
                calls: 0,
                fail_at: None,
            }),
            Gallery::from_entries(vec![GalleryEntry {
                label: "alice".to_string(),
                embedding: Embedding::new(vec![1.0, 2.0]),
            }]),
            0.8,
        );
        let stop = AtomicBool::new(false);

        let result = run(&mut camera, &mut processor, &mut renderer, &stop);

        assert!(matches!(result, Err(DriverError::Pipeline(_))));
        assert_eq!(*journal.borrow(), vec!["release", "close"]);
    }
}
