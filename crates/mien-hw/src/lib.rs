//! mien-hw: hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access with RGB24 output regardless of the
//! pixel format the driver negotiates.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraOptions, DeviceInfo, FrameSource, PixelFormat};
pub use frame::{Frame, FrameError};
