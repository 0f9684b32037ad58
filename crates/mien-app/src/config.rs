use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_DEVICE: &str = "/dev/video0";
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_FPS: u32 = 25;
pub const DEFAULT_WINDOW_TITLE: &str = "Face Recognition App";
pub const DEFAULT_GALLERY_DIR: &str = "data/known_faces";
pub const DEFAULT_MODEL_DIR: &str = "data/models";
pub const DEFAULT_TOLERANCE: f32 = 0.8;
pub const DEFAULT_DETECTOR_INPUT_SIZE: usize = 640;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("match tolerance must be a positive finite distance, got {0}")]
    InvalidTolerance(f32),
    #[error("capture resolution must be nonzero, got {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
    #[error("detector input size must be a positive multiple of 32, got {0}")]
    InvalidDetectorInputSize(usize),
}

/// Resolved application settings, assembled from CLI flags and `MIEN_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// V4L2 device path (default: /dev/video0).
    pub device: String,
    /// Requested capture width in pixels.
    pub width: u32,
    /// Requested capture height in pixels.
    pub height: u32,
    /// Requested capture frame rate.
    pub fps: u32,
    /// Title of the preview window.
    #[cfg_attr(not(feature = "window"), allow(dead_code))]
    pub window_title: String,
    /// Directory with one subdirectory of reference images per person.
    pub gallery_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum L2 embedding distance still accepted as a match.
    pub tolerance: f32,
    /// Square SCRFD input edge (multiple of 32).
    pub detector_input_size: usize,
    /// Run without a preview window, logging matches instead.
    pub headless: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            window_title: DEFAULT_WINDOW_TITLE.to_string(),
            gallery_dir: PathBuf::from(DEFAULT_GALLERY_DIR),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            tolerance: DEFAULT_TOLERANCE,
            detector_input_size: DEFAULT_DETECTOR_INPUT_SIZE,
            headless: false,
        }
    }
}

impl AppConfig {
    /// Reject settings that would only fail later and further from the cause.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidResolution {
                width: self.width,
                height: self.height,
            });
        }
        if self.detector_input_size == 0 || self.detector_input_size % 32 != 0 {
            return Err(ConfigError::InvalidDetectorInputSize(self.detector_input_size));
        }
        Ok(())
    }
}
