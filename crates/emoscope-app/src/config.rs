use emoscope_hw::{CapturePolicy, StreamRequest};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Preferred capture resolution.
    pub capture: StreamRequest,
    /// Frames discarded after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Whether camera capture may be started at all.
    pub capture_enabled: bool,
    /// Where model bundles come from: an `http(s)://` base URL, a `file://`
    /// URL or a local directory. `None` uses `model_dir` directly.
    pub model_url: Option<String>,
    /// Local model cache directory.
    pub model_dir: PathBuf,
    /// Display time for informational notifications.
    pub info_toast: Duration,
    /// Display time for error notifications.
    pub error_toast: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            capture: StreamRequest::default(),
            warmup_frames: 4,
            capture_enabled: true,
            model_url: None,
            model_dir: emoscope_core::default_model_dir(),
            info_toast: Duration::from_millis(3000),
            error_toast: Duration::from_millis(5000),
        }
    }
}

impl Config {
    /// Load configuration from `EMOSCOPE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            camera_device: std::env::var("EMOSCOPE_CAMERA_DEVICE")
                .unwrap_or(defaults.camera_device),
            capture: StreamRequest {
                width: env_parse("EMOSCOPE_CAPTURE_WIDTH", defaults.capture.width),
                height: env_parse("EMOSCOPE_CAPTURE_HEIGHT", defaults.capture.height),
            },
            warmup_frames: env_parse("EMOSCOPE_WARMUP_FRAMES", defaults.warmup_frames),
            capture_enabled: std::env::var("EMOSCOPE_CAPTURE_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(defaults.capture_enabled),
            model_url: std::env::var("EMOSCOPE_MODEL_URL").ok().filter(|v| !v.is_empty()),
            model_dir: std::env::var("EMOSCOPE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            info_toast: Duration::from_millis(env_parse("EMOSCOPE_INFO_TOAST_MS", 3000)),
            error_toast: Duration::from_millis(env_parse("EMOSCOPE_ERROR_TOAST_MS", 5000)),
        }
    }

    pub fn capture_policy(&self) -> CapturePolicy {
        if self.capture_enabled {
            CapturePolicy::Allowed
        } else {
            CapturePolicy::Blocked
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.capture, StreamRequest { width: 640, height: 480 });
        assert!(config.info_toast < config.error_toast);
        assert_eq!(config.capture_policy(), CapturePolicy::Allowed);
    }

    #[test]
    fn test_disabled_capture_blocks() {
        let config = Config { capture_enabled: false, ..Config::default() };
        assert_eq!(config.capture_policy(), CapturePolicy::Blocked);
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("EMOSCOPE_TEST_GARBAGE_U32", "not-a-number");
        assert_eq!(env_parse("EMOSCOPE_TEST_GARBAGE_U32", 7u32), 7);
        std::env::set_var("EMOSCOPE_TEST_GOOD_U32", "42");
        assert_eq!(env_parse("EMOSCOPE_TEST_GOOD_U32", 7u32), 42);
    }
}
