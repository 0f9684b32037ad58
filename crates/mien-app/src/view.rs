//! Overlay rendering: the preview window and its headless stand-in.

use mien_core::{OverlayFace, UNKNOWN_LABEL};
use mien_hw::Frame;
use thiserror::Error;

/// Box and band color for recognized faces (RGB).
pub const COLOR_KNOWN: (u8, u8, u8) = (0, 255, 0);
/// Box and band color for unknown faces (RGB).
pub const COLOR_UNKNOWN: (u8, u8, u8) = (255, 0, 0);

#[derive(Error, Debug)]
pub enum ViewError {
    #[cfg_attr(not(feature = "window"), allow(dead_code))]
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    BadFrame { expected: usize, actual: usize },
    #[cfg(feature = "window")]
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Sink for processed frames. The driver owns one for the whole session.
pub trait FrameRenderer {
    /// Draw the frame with its overlays and the frame-rate readout.
    fn show(&mut self, frame: &Frame, overlays: &[OverlayFace], fps: f64) -> Result<(), ViewError>;

    /// True when the user asked to quit (ESC or the q key).
    fn poll_quit(&mut self) -> Result<bool, ViewError>;

    /// Tear down the window. Idempotent.
    fn close(&mut self);
}

fn format_label(face: &OverlayFace) -> String {
    format!("{} ({:.0}%)", face.label, face.confidence * 100.0)
}

#[cfg_attr(not(feature = "window"), allow(dead_code))]
fn overlay_color(face: &OverlayFace) -> (u8, u8, u8) {
    if face.label == UNKNOWN_LABEL {
        COLOR_UNKNOWN
    } else {
        COLOR_KNOWN
    }
}

/// Renderer for sessions without a display. Faces are traced instead of drawn
/// and no quit key exists; the session ends via Ctrl-C.
pub struct HeadlessView;

impl FrameRenderer for HeadlessView {
    fn show(
        &mut self,
        _frame: &Frame,
        overlays: &[OverlayFace],
        fps: f64,
    ) -> Result<(), ViewError> {
        for face in overlays {
            tracing::debug!(face = %format_label(face), fps, "face");
        }
        Ok(())
    }

    fn poll_quit(&mut self) -> Result<bool, ViewError> {
        Ok(false)
    }

    fn close(&mut self) {}
}

#[cfg(feature = "window")]
mod window {
    use super::{format_label, overlay_color, FrameRenderer, ViewError};
    use mien_core::OverlayFace;
    use mien_hw::Frame;
    use opencv::core::{Mat, Point, Rect, Scalar, Vec3b};
    use opencv::{highgui, imgproc};

    const COLOR_LABEL_TEXT: (u8, u8, u8) = (255, 255, 255);
    const COLOR_FPS_TEXT: (u8, u8, u8) = (255, 255, 0);
    const RECT_THICKNESS: i32 = 2;
    const LABEL_BAND_HEIGHT: i32 = 20;
    const LABEL_TEXT_SCALE: f64 = 0.5;
    const FPS_TEXT_SCALE: f64 = 0.6;
    const QUIT_KEY_ESC: i32 = 27;
    const QUIT_KEY_Q: i32 = 113;

    /// OpenCV highgui preview window.
    pub struct PreviewWindow {
        title: String,
        open: bool,
    }

    impl PreviewWindow {
        pub fn open(title: &str) -> Result<Self, ViewError> {
            highgui::named_window(title, highgui::WINDOW_AUTOSIZE)?;
            Ok(Self {
                title: title.to_string(),
                open: true,
            })
        }
    }

    /// OpenCV draws in BGR; Scalar channel order is (b, g, r, alpha).
    fn scalar_bgr(rgb: (u8, u8, u8)) -> Scalar {
        Scalar::new(rgb.2 as f64, rgb.1 as f64, rgb.0 as f64, 0.0)
    }

    fn mat_from_rgb(frame: &Frame) -> Result<Mat, ViewError> {
        let expected = (frame.width * frame.height * 3) as usize;
        if frame.data.len() != expected {
            return Err(ViewError::BadFrame {
                expected,
                actual: frame.data.len(),
            });
        }

        let pixels: Vec<Vec3b> = frame
            .data
            .chunks_exact(3)
            .map(|px| Vec3b::from([px[0], px[1], px[2]]))
            .collect();

        let rgb =
            Mat::new_rows_cols_with_data(frame.height as i32, frame.width as i32, &pixels)?
                .try_clone()?;

        let mut bgr = Mat::default();
        imgproc::cvt_color(
            &rgb,
            &mut bgr,
            imgproc::COLOR_RGB2BGR,
            0,
            opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )?;
        Ok(bgr)
    }

    impl FrameRenderer for PreviewWindow {
        fn show(
            &mut self,
            frame: &Frame,
            overlays: &[OverlayFace],
            fps: f64,
        ) -> Result<(), ViewError> {
            let mut canvas = mat_from_rgb(frame)?;

            for face in overlays {
                let color = scalar_bgr(overlay_color(face));
                let left = face.bbox.left().round() as i32;
                let top = face.bbox.top().round() as i32;
                let right = face.bbox.right().round() as i32;
                let bottom = face.bbox.bottom().round() as i32;

                let outline = Rect::new(left, top, right - left, bottom - top);
                imgproc::rectangle(
                    &mut canvas,
                    outline,
                    color,
                    RECT_THICKNESS,
                    imgproc::LINE_8,
                    0,
                )?;

                // Filled band along the bottom edge carrying the label.
                let band = Rect::new(
                    left,
                    bottom - LABEL_BAND_HEIGHT,
                    right - left,
                    LABEL_BAND_HEIGHT,
                );
                imgproc::rectangle(&mut canvas, band, color, imgproc::FILLED, imgproc::LINE_8, 0)?;

                imgproc::put_text(
                    &mut canvas,
                    &format_label(face),
                    Point::new(left + 2, bottom - 5),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    LABEL_TEXT_SCALE,
                    scalar_bgr(COLOR_LABEL_TEXT),
                    1,
                    imgproc::LINE_8,
                    false,
                )?;
            }

            imgproc::put_text(
                &mut canvas,
                &format!("FPS: {fps:.1}"),
                Point::new(10, 20),
                imgproc::FONT_HERSHEY_SIMPLEX,
                FPS_TEXT_SCALE,
                scalar_bgr(COLOR_FPS_TEXT),
                2,
                imgproc::LINE_8,
                false,
            )?;

            highgui::imshow(&self.title, &canvas)?;
            Ok(())
        }

        fn poll_quit(&mut self) -> Result<bool, ViewError> {
            let key = highgui::wait_key(1)?;
            Ok(key == QUIT_KEY_ESC || key == QUIT_KEY_Q)
        }

        fn close(&mut self) {
            if self.open {
                if let Err(err) = highgui::destroy_window(&self.title) {
                    tracing::warn!(error = %err, "failed to destroy preview window");
                }
                self.open = false;
            }
        }
    }
}

#[cfg(feature = "window")]
pub use window::PreviewWindow;
