//! Test doubles shared by the unit tests.

use crate::notify::Toast;
use crate::render::ResultsView;
use crate::screen::Screen;
use crate::surface::Surface;
use emoscope_core::detector::DetectorError;
use emoscope_core::{ExpressionDetector, ExpressionScores, InferenceError};
use emoscope_hw::{
    CameraError, CameraManager, CaptureBackend, CapturePolicy, CaptureStream, Frame, StreamInfo, StreamRequest,
};
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

pub type ScriptedReply = Result<Option<ExpressionScores>, InferenceError>;

/// Replays canned answers in order; answers "no face" once exhausted.
pub struct ScriptedDetector {
    replies: VecDeque<ScriptedReply>,
}

impl ScriptedDetector {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self { replies: replies.into() }
    }

    pub fn failure() -> InferenceError {
        InferenceError::Detector(DetectorError::InferenceFailed("scripted failure".into()))
    }
}

impl ExpressionDetector for ScriptedDetector {
    fn detect_single(&mut self, _image: &RgbImage) -> ScriptedReply {
        self.replies.pop_front().unwrap_or(Ok(None))
    }
}

pub fn happy_scores() -> ExpressionScores {
    ExpressionScores::from_pairs([("neutral", 0.15), ("happy", 0.82), ("sad", 0.002)])
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Screen(Screen),
    Preview(StreamInfo),
    Results(u64),
    Toast(String),
    HideToast,
}

/// Records every call in order.
#[derive(Default)]
pub struct RecordingSurface {
    pub events: Vec<SurfaceEvent>,
    pub results: Vec<ResultsView>,
}

impl RecordingSurface {
    pub fn screens(&self) -> Vec<Screen> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Screen(s) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn show_screen(&mut self, screen: Screen) {
        self.events.push(SurfaceEvent::Screen(screen));
    }

    fn attach_preview(&mut self, stream: &StreamInfo) {
        self.events.push(SurfaceEvent::Preview(stream.clone()));
    }

    fn show_results(&mut self, view: &ResultsView) {
        self.events.push(SurfaceEvent::Results(view.session_count));
        self.results.push(view.clone());
    }

    fn show_toast(&mut self, toast: &Toast) {
        self.events.push(SurfaceEvent::Toast(toast.message.clone()));
    }

    fn hide_toast(&mut self) {
        self.events.push(SurfaceEvent::HideToast);
    }
}

/// Shared knobs and counters for [`test_camera`].
pub struct CameraControl {
    opens: AtomicUsize,
    stops: AtomicUsize,
    frame_ready: AtomicBool,
    fail_next: Mutex<Option<CameraError>>,
    io_threads: Mutex<Vec<ThreadId>>,
}

impl CameraControl {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set_frame_ready(&self, ready: bool) {
        self.frame_ready.store(ready, Ordering::SeqCst);
    }

    pub fn fail_next_open(&self, error: CameraError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Threads that performed device calls (open, snapshot, stop), in order.
    pub fn io_threads(&self) -> Vec<ThreadId> {
        self.io_threads.lock().unwrap().clone()
    }

    fn record_io(&self) {
        self.io_threads.lock().unwrap().push(std::thread::current().id());
    }
}

struct ControlledBackend {
    control: Arc<CameraControl>,
}

impl CaptureBackend for ControlledBackend {
    fn open(&mut self, _request: &StreamRequest) -> Result<Box<dyn CaptureStream>, CameraError> {
        self.control.opens.fetch_add(1, Ordering::SeqCst);
        self.control.record_io();
        if let Some(error) = self.control.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        Ok(Box::new(ControlledStream {
            control: Arc::clone(&self.control),
            sequence: 0,
        }))
    }
}

struct ControlledStream {
    control: Arc<CameraControl>,
    sequence: u32,
}

impl CaptureStream for ControlledStream {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            device: "/dev/video-test".into(),
            width: 8,
            height: 6,
        }
    }

    fn snapshot(&mut self) -> Result<Option<Frame>, CameraError> {
        self.control.record_io();
        if !self.control.frame_ready.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.sequence += 1;
        Ok(Some(Frame {
            data: vec![128; 8 * 6 * 3],
            width: 8,
            height: 6,
            timestamp: std::time::Instant::now(),
            sequence: self.sequence,
        }))
    }

    fn stop(&mut self) {
        self.control.record_io();
        self.control.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A camera manager backed by an in-memory 8x6 stream.
pub fn test_camera() -> (CameraManager, Arc<CameraControl>) {
    let control = Arc::new(CameraControl {
        opens: AtomicUsize::new(0),
        stops: AtomicUsize::new(0),
        frame_ready: AtomicBool::new(true),
        fail_next: Mutex::new(None),
        io_threads: Mutex::new(Vec::new()),
    });
    let backend = ControlledBackend { control: Arc::clone(&control) };
    let camera = CameraManager::new(Box::new(backend), StreamRequest::default(), CapturePolicy::Allowed);
    (camera, control)
}
