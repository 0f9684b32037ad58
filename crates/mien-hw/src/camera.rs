//! V4L2 camera capture via the `v4l` crate.
//!
//! Holds a memory-mapped capture stream open for the whole session and
//! converts every dequeued buffer to RGB24.

use crate::frame::{self, Frame, FrameError};
use ouroboros::self_referencing;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;
const DEVICE_PROBE_LIMIT: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("camera already released")]
    Released,
    #[error("frame conversion failed: {0}")]
    Conversion(#[from] FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Capture settings requested from the driver. The driver may answer with
/// different values; the negotiated ones are reported on the open camera.
#[derive(Debug, Clone)]
pub struct CameraOptions {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 25,
        }
    }
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed RGB24 (3 bytes/pixel, no conversion needed).
    Rgb3,
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG (compressed, decoded per frame).
    Mjpg,
}

/// Formats we can convert, most preferred first.
const FORMAT_PREFERENCE: [PixelFormat; 3] =
    [PixelFormat::Rgb3, PixelFormat::Yuyv, PixelFormat::Mjpg];

impl PixelFormat {
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"RGB3") {
            Some(Self::Rgb3)
        } else if fourcc == FourCC::new(b"YUYV") {
            Some(Self::Yuyv)
        } else if fourcc == FourCC::new(b"MJPG") {
            Some(Self::Mjpg)
        } else {
            None
        }
    }

    fn fourcc(self) -> FourCC {
        match self {
            Self::Rgb3 => FourCC::new(b"RGB3"),
            Self::Yuyv => FourCC::new(b"YUYV"),
            Self::Mjpg => FourCC::new(b"MJPG"),
        }
    }
}

/// Anything the render loop can pull RGB frames from.
pub trait FrameSource {
    fn read(&mut self) -> Result<Frame, CameraError>;

    /// Stop streaming and close the device. Safe to call more than once;
    /// reads after release fail with [`CameraError::Released`].
    fn release(&mut self);
}

#[self_referencing]
struct CameraState {
    device: Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this>,
}

/// V4L2 camera device handle producing RGB24 frames.
pub struct Camera {
    state: Option<CameraState>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and start streaming.
    ///
    /// Tries RGB3, then YUYV, then MJPG. The driver's answer is accepted if it
    /// is any of the three, even when it differs from the request.
    pub fn open(device_path: &str, options: &CameraOptions) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut negotiated = None;
        for candidate in FORMAT_PREFERENCE {
            let mut fmt = device.format().map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
            })?;
            fmt.width = options.width;
            fmt.height = options.height;
            fmt.fourcc = candidate.fourcc();

            match device.set_format(&fmt) {
                Ok(result) => {
                    if let Some(pf) = PixelFormat::from_fourcc(result.fourcc) {
                        negotiated = Some((result, pf));
                        break;
                    }
                    tracing::debug!(
                        requested = ?candidate,
                        answered = ?result.fourcc,
                        "driver answered with a format we cannot convert, trying next"
                    );
                }
                Err(err) => {
                    tracing::debug!(requested = ?candidate, error = %err, "set_format refused, trying next");
                }
            }
        }

        let Some((format, pixel_format)) = negotiated else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "{device_path} offers none of RGB3, YUYV, MJPG"
            )));
        };

        if options.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(options.fps);
            if let Err(err) = device.set_params(&params) {
                tracing::warn!(
                    device = device_path,
                    fps = options.fps,
                    error = %err,
                    "failed to set frame rate, driver default applies"
                );
            }
        }

        tracing::info!(
            width = format.width,
            height = format.height,
            fourcc = ?format.fourcc,
            "negotiated format"
        );

        let state = CameraStateTryBuilder {
            device,
            stream_builder: |device| {
                MmapStream::with_buffers(device, BufType::VideoCapture, STREAM_BUFFERS)
            },
        }
        .try_build()
        .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        Ok(Self {
            state: Some(state),
            width: format.width,
            height: format.height,
            device_path: device_path.to_string(),
            fourcc: format.fourcc,
            pixel_format,
        })
    }

    /// Dequeue the next buffer and convert it to an RGB24 frame.
    pub fn read(&mut self) -> Result<Frame, CameraError> {
        let state = self.state.as_mut().ok_or(CameraError::Released)?;

        let (raw, sequence) = state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map(|(buf, meta)| (buf.to_vec(), meta.sequence))
            })
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let (data, width, height) = match self.pixel_format {
            PixelFormat::Rgb3 => {
                let rgb = frame::rgb3_to_rgb(&raw, self.width, self.height)?;
                (rgb, self.width, self.height)
            }
            PixelFormat::Yuyv => {
                let rgb = frame::yuyv_to_rgb(&raw, self.width, self.height)?;
                (rgb, self.width, self.height)
            }
            // MJPG frames carry their own dimensions; trust the decode.
            PixelFormat::Mjpg => frame::mjpg_to_rgb(&raw)?,
        };

        Ok(Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    /// Stop streaming and close the device. Idempotent.
    pub fn release(&mut self) {
        if self.state.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..DEVICE_PROBE_LIMIT {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<Frame, CameraError> {
        Camera::read(self)
    }

    fn release(&mut self) {
        Camera::release(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fourcc() {
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"RGB3")),
            Some(PixelFormat::Rgb3)
        );
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"YUYV")),
            Some(PixelFormat::Yuyv)
        );
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"MJPG")),
            Some(PixelFormat::Mjpg)
        );
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }

    #[test]
    fn test_fourcc_roundtrip() {
        for pf in FORMAT_PREFERENCE {
            assert_eq!(PixelFormat::from_fourcc(pf.fourcc()), Some(pf));
        }
    }

    #[test]
    fn test_preference_starts_with_rgb3() {
        assert_eq!(FORMAT_PREFERENCE[0], PixelFormat::Rgb3);
    }

    #[test]
    fn test_open_missing_device() {
        let result = Camera::open("/dev/video-does-not-exist", &CameraOptions::default());
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_read_after_release() {
        let mut camera = Camera {
            state: None,
            width: 640,
            height: 480,
            device_path: "/dev/video0".to_string(),
            fourcc: FourCC::new(b"RGB3"),
            pixel_format: PixelFormat::Rgb3,
        };
        assert!(matches!(camera.read(), Err(CameraError::Released)));
        // Releasing again must not panic.
        camera.release();
        camera.release();
    }

    #[test]
    fn test_default_options() {
        let opts = CameraOptions::default();
        assert_eq!((opts.width, opts.height, opts.fps), (640, 480, 25));
    }
}
