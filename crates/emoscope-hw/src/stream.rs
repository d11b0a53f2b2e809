//! Capture stream lifecycle.
//!
//! [`CameraManager`] owns at most one live [`CaptureStream`]. Acquiring while
//! a stream is active hands back the same stream without reopening the
//! device; releasing stops it and is safe to repeat.

use crate::camera::CameraError;
use crate::frame::Frame;

/// Preferred capture resolution. Drivers may negotiate something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub width: u32,
    pub height: u32,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Negotiated properties of an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

/// Whether capture may be started at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePolicy {
    Allowed,
    Blocked,
}

/// Opens capture streams. Each call may prompt for device access.
pub trait CaptureBackend: Send {
    fn open(&mut self, request: &StreamRequest) -> Result<Box<dyn CaptureStream>, CameraError>;
}

/// A live video stream.
pub trait CaptureStream: Send {
    fn info(&self) -> StreamInfo;

    /// Grab the current frame. `Ok(None)` means the stream has no decodable
    /// frame yet.
    fn snapshot(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Stop capturing and release the device.
    fn stop(&mut self);
}

/// Owner of the single active capture stream.
pub struct CameraManager {
    backend: Box<dyn CaptureBackend>,
    request: StreamRequest,
    policy: CapturePolicy,
    active: Option<Box<dyn CaptureStream>>,
}

impl CameraManager {
    pub fn new(backend: Box<dyn CaptureBackend>, request: StreamRequest, policy: CapturePolicy) -> Self {
        Self {
            backend,
            request,
            policy,
            active: None,
        }
    }

    /// Start capturing, or reuse the stream that is already running.
    pub fn acquire(&mut self) -> Result<StreamInfo, CameraError> {
        if self.policy == CapturePolicy::Blocked {
            tracing::warn!("capture blocked by policy");
            return Err(CameraError::BlockedByPolicy);
        }

        if let Some(stream) = &self.active {
            let info = stream.info();
            tracing::debug!(device = %info.device, "reusing active stream");
            return Ok(info);
        }

        let stream = self.backend.open(&self.request)?;
        let info = stream.info();
        tracing::info!(
            device = %info.device,
            width = info.width,
            height = info.height,
            "capture stream started"
        );
        self.active = Some(stream);
        Ok(info)
    }

    /// Stop the active stream, if any.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.active.take() {
            stream.stop();
            tracing::info!("capture stream released");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_info(&self) -> Option<StreamInfo> {
        self.active.as_ref().map(|s| s.info())
    }

    /// Grab the current frame from the active stream.
    pub fn snapshot(&mut self) -> Result<Option<Frame>, CameraError> {
        self.active.as_mut().ok_or(CameraError::NotActive)?.snapshot()
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.release();
    }
}
