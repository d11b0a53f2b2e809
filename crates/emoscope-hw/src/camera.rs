//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::stream::{CaptureBackend, CaptureStream, StreamInfo, StreamRequest};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream as _;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Share of near-black pixels above which a frame is treated as not ready.
const DARK_FRAME_THRESHOLD: f32 = 0.95;
const MMAP_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("camera capture is disabled")]
    BlockedByPolicy,
    #[error("no active camera stream")]
    NotActive,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Coarse classification of acquisition failures, one user message each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    PermissionDenied,
    DeviceNotFound,
    Other,
}

impl CameraError {
    pub fn category(&self) -> FailureCategory {
        match self {
            CameraError::PermissionDenied(_) => FailureCategory::PermissionDenied,
            CameraError::DeviceNotFound(_) => FailureCategory::DeviceNotFound,
            _ => FailureCategory::Other,
        }
    }

    /// Classify an OS error raised while opening `device_path`.
    pub fn from_open_error(device_path: &str, err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => {
                CameraError::PermissionDenied(format!("{device_path}: {err}"))
            }
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                CameraError::DeviceNotFound(format!("{device_path}: {err}"))
            }
            Some(libc::EBUSY) => CameraError::DeviceBusy,
            _ if err.kind() == io::ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(format!("{device_path}: {err}"))
            }
            _ if err.kind() == io::ErrorKind::NotFound => {
                CameraError::DeviceNotFound(format!("{device_path}: {err}"))
            }
            _ => CameraError::CaptureFailed(format!("{device_path}: {err}")),
        }
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB.
    Rgb3,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"RGB3") {
            Some(PixelFormat::Rgb3)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else {
            None
        }
    }
}

/// Opens V4L2 devices.
pub struct V4l2Backend {
    device_path: String,
    warmup_frames: usize,
}

impl V4l2Backend {
    pub fn new(device_path: impl Into<String>, warmup_frames: usize) -> Self {
        Self {
            device_path: device_path.into(),
            warmup_frames,
        }
    }
}

impl CaptureBackend for V4l2Backend {
    fn open(&mut self, request: &StreamRequest) -> Result<Box<dyn CaptureStream>, CameraError> {
        let mut camera = Camera::open(&self.device_path, request)?;
        if self.warmup_frames > 0 {
            tracing::debug!(count = self.warmup_frames, "discarding warmup frames");
            camera.discard_frames(self.warmup_frames)?;
        }
        Ok(Box::new(camera))
    }
}

/// V4L2 camera device handle.
///
/// The mmap stream is started once and kept running until [`CaptureStream::stop`],
/// so warm-up frames and exposure settle on the same stream that is sampled.
pub struct Camera {
    // Declared before `device` so it is dropped (STREAMOFF) first.
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
    info: StreamInfo,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device and negotiate the requested resolution.
    pub fn open(device_path: &str, request: &StreamRequest) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path)
            .map_err(|e| CameraError::from_open_error(device_path, &e))?;

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

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = request.width;
        fmt.height = request.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, RGB3, or GREY)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            stream: None,
            device: Some(device),
            info: StreamInfo {
                device: device_path.to_string(),
                width: negotiated.width,
                height: negotiated.height,
            },
            pixel_format,
        })
    }

    /// The running mmap stream, started on first use.
    fn stream(&mut self) -> Result<&mut MmapStream<'static>, CameraError> {
        if self.stream.is_none() {
            let device = self.device.as_ref().ok_or(CameraError::NotActive)?;
            let stream = MmapStream::with_buffers(device, BufType::VideoCapture, MMAP_BUFFERS)
                .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
            tracing::debug!(device = %self.info.device, buffers = MMAP_BUFFERS, "streaming started");
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or(CameraError::NotActive)
    }

    /// Dequeue one buffer and copy out its used bytes.
    fn dequeue(&mut self) -> Result<(Vec<u8>, u32), CameraError> {
        let stream = self.stream()?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let used = (meta.bytesused as usize).min(buf.len());
        Ok((buf[..used].to_vec(), meta.sequence))
    }

    fn discard_frames(&mut self, count: usize) -> Result<(), CameraError> {
        for _ in 0..count {
            self.dequeue()?;
        }
        Ok(())
    }

    /// Convert a raw buffer to packed RGB based on the negotiated format.
    fn buf_to_rgb(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let (w, h) = (self.info.width, self.info.height);
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, w, h),
            PixelFormat::Grey => frame::grey_to_rgb(buf, w, h),
            PixelFormat::Rgb3 => {
                let expected = w as usize * h as usize * 3;
                if buf.len() < expected {
                    return Ok(buf.to_vec());
                }
                Ok(buf[..expected].to_vec())
            }
        };
        converted.map_err(|e| CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format)))
    }
}

impl CaptureStream for Camera {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn snapshot(&mut self) -> Result<Option<Frame>, CameraError> {
        // Buffers filled while nobody was reading are stale; cycle through
        // the ring so the frame returned is current.
        let mut latest = self.dequeue()?;
        for _ in 1..MMAP_BUFFERS {
            latest = self.dequeue()?;
        }
        let (raw, sequence) = latest;

        let data = match self.buf_to_rgb(&raw) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(seq = sequence, error = %e, "incomplete frame");
                return Ok(None);
            }
        };

        Ok(ready_frame(Frame {
            data,
            width: self.info.width,
            height: self.info.height,
            timestamp: std::time::Instant::now(),
            sequence,
        }))
    }

    fn stop(&mut self) {
        self.stream = None;
        if self.device.take().is_some() {
            tracing::info!(device = %self.info.device, "camera closed");
        }
    }
}

/// Accept a converted frame only if it is whole and not dark.
fn ready_frame(frame: Frame) -> Option<Frame> {
    if !frame.is_complete() {
        tracing::debug!(seq = frame.sequence, "short frame");
        return None;
    }
    if frame::is_dark_frame(&frame.data, DARK_FRAME_THRESHOLD) {
        tracing::debug!(seq = frame.sequence, "dark frame, exposure still settling");
        return None;
    }
    Some(frame)
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for i in 0..16 {
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
