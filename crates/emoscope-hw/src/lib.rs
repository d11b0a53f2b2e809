//! emoscope-hw — Camera capture and stream lifecycle.
//!
//! Provides V4L2-based capture converted to packed RGB, and the camera
//! manager that keeps at most one stream alive.

pub mod camera;
pub mod frame;
pub mod stream;

pub use camera::{list_devices, CameraError, DeviceInfo, FailureCategory, PixelFormat, V4l2Backend};
pub use frame::Frame;
pub use stream::{CameraManager, CaptureBackend, CapturePolicy, CaptureStream, StreamInfo, StreamRequest};
