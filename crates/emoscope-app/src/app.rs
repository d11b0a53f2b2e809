//! Analysis orchestration.
//!
//! [`App`] owns the application state (model readiness, session counter,
//! the latest analysis ticket), the screen controller, the camera manager and
//! the engine handle. Every failure path ends on a defined screen with a
//! notification.
//!
//! Analyses follow a latest-wins policy: each request takes a ticket, and a
//! newer request or a user-driven screen change supersedes older tickets.
//! Completing a superseded ticket changes nothing.

use crate::config::Config;
use crate::engine::{spawn_engine, DetectionReply, EngineError, EngineHandle};
use crate::loader::{LoadError, ModelLoader};
use crate::notify::{Notifier, Severity, Toast};
use crate::render::{self, ResultImage, ResultsView, SessionCounter};
use crate::screen::{Screen, ScreenController};
use crate::surface::Surface;
use emoscope_hw::{CameraError, CameraManager, FailureCategory, StreamInfo};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::oneshot;

pub mod messages {
    pub const MODELS_NOT_READY: &str =
        "The expression models are still loading. Please wait a moment and try again.";
    pub const MODEL_LOAD_FAILED: &str =
        "Could not load the expression models. Check the model location and restart.";
    pub const CAMERA_PERMISSION_DENIED: &str =
        "Camera access was denied. Allow access to the camera and try again.";
    pub const CAMERA_NOT_FOUND: &str =
        "No camera was found. Connect a camera or upload a photo instead.";
    pub const CAMERA_BLOCKED: &str =
        "Camera capture is disabled here. Upload a photo instead.";
    pub const CAMERA_FAILED: &str =
        "Could not start the camera. Try again or upload a photo instead.";
    pub const FRAME_NOT_READY: &str =
        "The camera is still starting up. Please try again in a moment.";
    pub const NO_FACE: &str =
        "No face detected. Make sure your face is well lit and centered in the frame.";
    pub const UPLOAD_FAILED: &str = "That file could not be opened as an image.";
    pub const TECHNICAL_ERROR: &str =
        "Something went wrong while analyzing the image. Please try again.";
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("frame: {0}")]
    Frame(#[from] emoscope_hw::frame::FrameError),
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("classifier returned no categories")]
    EmptyScores,
}

/// An uploaded image, already decoded.
#[derive(Debug, Clone)]
pub struct StillImage {
    pub path: PathBuf,
    pub image: Arc<RgbImage>,
}

impl StillImage {
    /// Read the whole file and decode it.
    pub async fn open(path: &Path) -> Result<Self, AnalysisError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| AnalysisError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let image = image::load_from_memory(&bytes)?.to_rgb8();
        Ok(Self {
            path: path.to_path_buf(),
            image: Arc::new(image),
        })
    }
}

/// What to analyze.
#[derive(Debug, Clone)]
pub enum AnalysisSource {
    /// The current frame of the active camera stream, snapshotted at its
    /// native resolution.
    Live,
    /// A decoded image, used as-is.
    Still(StillImage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Live,
    Still,
}

/// How an analysis request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Rendered(Box<ResultsView>),
    ModelsNotReady,
    FrameNotReady,
    NoFace,
    Failed,
    Superseded,
}

/// Long-lived state, created at startup and mutated only by [`App`].
#[derive(Debug, Default)]
pub struct AppState {
    pub models_ready: bool,
    pub session: SessionCounter,
    latest_ticket: u64,
}

impl AppState {
    pub fn latest_ticket(&self) -> u64 {
        self.latest_ticket
    }
}

/// Image retained for the results screen.
enum Display {
    File(PathBuf),
    Frame(Arc<RgbImage>),
}

/// An analysis submitted to the engine and not yet completed.
pub struct PendingAnalysis {
    ticket: u64,
    kind: SourceKind,
    display: Display,
    reply: oneshot::Receiver<DetectionReply>,
}

impl PendingAnalysis {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Wait for the engine's answer.
    pub async fn wait(self) -> FinishedAnalysis {
        let reply = self
            .reply
            .await
            .unwrap_or_else(|_| Err(EngineError::ChannelClosed));
        FinishedAnalysis {
            ticket: self.ticket,
            kind: self.kind,
            display: self.display,
            reply,
        }
    }
}

/// Engine answer paired with its request, ready to be applied.
pub struct FinishedAnalysis {
    ticket: u64,
    kind: SourceKind,
    display: Display,
    reply: DetectionReply,
}

impl FinishedAnalysis {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

pub struct App<S: Surface> {
    state: AppState,
    screens: ScreenController,
    // V4L2 calls block, so the manager is only touched on the blocking pool.
    camera: Arc<Mutex<CameraManager>>,
    preview: Option<StreamInfo>,
    engine: Option<EngineHandle>,
    notifier: Notifier,
    surface: S,
}

impl<S: Surface> App<S> {
    pub fn new(config: &Config, camera: CameraManager, mut surface: S) -> Self {
        let screens = ScreenController::default();
        surface.show_screen(screens.current());
        Self {
            state: AppState::default(),
            screens,
            camera: Arc::new(Mutex::new(camera)),
            preview: None,
            engine: None,
            notifier: Notifier::new(config.info_toast, config.error_toast),
            surface,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn screen(&self) -> Screen {
        self.screens.current()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Whether a capture stream is running.
    pub fn camera_active(&self) -> bool {
        self.preview.is_some()
    }

    pub fn notification(&self) -> Option<&Toast> {
        self.notifier.current()
    }

    /// Load both model bundles and start the engine.
    pub async fn start(&mut self, loader: &ModelLoader) {
        let engine = match loader.load().await {
            Ok(detector) => spawn_engine(Box::new(detector)).map_err(LoadError::from),
            Err(e) => Err(e),
        };
        self.models_loaded(engine);
    }

    /// Record the result of model loading. Readiness is set only on success.
    pub fn models_loaded(&mut self, result: Result<EngineHandle, LoadError>) {
        match result {
            Ok(engine) => {
                self.engine = Some(engine);
                self.state.models_ready = true;
                tracing::info!("models ready");
            }
            Err(e) => {
                self.engine = None;
                self.state.models_ready = false;
                tracing::error!(error = %e, "model loading failed");
                self.notify(messages::MODEL_LOAD_FAILED, Severity::Error);
            }
        }
    }

    pub fn notify(&mut self, message: &str, severity: Severity) {
        let toast = self.notifier.notify(message, severity, Instant::now());
        self.surface.show_toast(toast);
    }

    /// Hide the notification if it has expired.
    pub fn tick(&mut self, now: Instant) {
        if self.notifier.expire(now).is_some() {
            self.surface.hide_toast();
        }
    }

    /// User-driven screen change. Supersedes any in-flight analysis.
    pub fn show_screen(&mut self, target: Screen) {
        self.state.latest_ticket += 1;
        self.set_screen(target);
    }

    fn set_screen(&mut self, target: Screen) {
        self.screens.show(target);
        self.surface.show_screen(target);
        if target == Screen::Camera {
            if let Some(info) = &self.preview {
                self.surface.attach_preview(info);
            }
        }
    }

    async fn with_camera<T, F>(&self, op: F) -> Result<T, CameraError>
    where
        T: Send + 'static,
        F: FnOnce(&mut CameraManager) -> Result<T, CameraError> + Send + 'static,
    {
        let camera = Arc::clone(&self.camera);
        tokio::task::spawn_blocking(move || {
            let mut camera = camera.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut camera)
        })
        .await
        .map_err(|e| CameraError::CaptureFailed(format!("camera task failed: {e}")))?
    }

    /// Start (or reuse) the camera and show the camera screen.
    pub async fn open_camera(&mut self) -> bool {
        if !self.state.models_ready {
            self.notify(messages::MODELS_NOT_READY, Severity::Error);
            return false;
        }

        match self.with_camera(|camera| camera.acquire()).await {
            Ok(info) => {
                self.preview = Some(info);
                self.show_screen(Screen::Camera);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "camera acquisition failed");
                let message = match (&e, e.category()) {
                    (CameraError::BlockedByPolicy, _) => messages::CAMERA_BLOCKED,
                    (_, FailureCategory::PermissionDenied) => messages::CAMERA_PERMISSION_DENIED,
                    (_, FailureCategory::DeviceNotFound) => messages::CAMERA_NOT_FOUND,
                    (_, FailureCategory::Other) => messages::CAMERA_FAILED,
                };
                self.notify(message, Severity::Error);
                false
            }
        }
    }

    pub async fn stop_camera(&mut self) {
        let released = self
            .with_camera(|camera| {
                camera.release();
                Ok(())
            })
            .await;
        if let Err(e) = released {
            tracing::warn!(error = %e, "camera release failed");
        }
        self.preview = None;
    }

    /// Read and decode an uploaded file. Failures are reported and return
    /// to the welcome screen.
    pub async fn open_upload(&mut self, path: &Path) -> Option<AnalysisSource> {
        match StillImage::open(path).await {
            Ok(still) => Some(AnalysisSource::Still(still)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "upload rejected");
                self.state.latest_ticket += 1;
                self.set_screen(Screen::Welcome);
                self.notify(messages::UPLOAD_FAILED, Severity::Error);
                None
            }
        }
    }

    /// Run one analysis to completion.
    pub async fn analyze(&mut self, source: AnalysisSource) -> AnalysisOutcome {
        match self.begin_analysis(source).await {
            Ok(pending) => {
                let finished = pending.wait().await;
                self.complete_analysis(finished)
            }
            Err(outcome) => outcome,
        }
    }

    /// Normalize the source, switch to the loading screen and hand the image
    /// to the engine. `Err` carries the outcome when nothing was submitted.
    pub async fn begin_analysis(&mut self, source: AnalysisSource) -> Result<PendingAnalysis, AnalysisOutcome> {
        let Some(engine) = self.engine.clone().filter(|_| self.state.models_ready) else {
            self.notify(messages::MODELS_NOT_READY, Severity::Error);
            return Err(AnalysisOutcome::ModelsNotReady);
        };

        // Every accepted request supersedes older ones, even if it fails below.
        self.state.latest_ticket += 1;
        let ticket = self.state.latest_ticket;

        let (kind, image, display) = match source {
            AnalysisSource::Live => match self.with_camera(|camera| camera.snapshot()).await {
                Ok(Some(frame)) => match frame.to_rgb_image() {
                    Ok(image) => {
                        let image = Arc::new(image);
                        (SourceKind::Live, Arc::clone(&image), Display::Frame(image))
                    }
                    Err(e) => return Err(self.fail(SourceKind::Live, &AnalysisError::from(e))),
                },
                Ok(None) => {
                    tracing::debug!("live frame not ready");
                    self.set_screen(Screen::Camera);
                    self.notify(messages::FRAME_NOT_READY, Severity::Info);
                    return Err(AnalysisOutcome::FrameNotReady);
                }
                Err(e) => return Err(self.fail(SourceKind::Live, &AnalysisError::from(e))),
            },
            AnalysisSource::Still(still) => {
                (SourceKind::Still, still.image, Display::File(still.path))
            }
        };

        self.set_screen(Screen::Loading);
        tracing::debug!(ticket, ?kind, "analysis submitted");

        match engine.submit(image).await {
            Ok(reply) => Ok(PendingAnalysis {
                ticket,
                kind,
                display,
                reply,
            }),
            Err(e) => Err(self.fail(kind, &AnalysisError::from(e))),
        }
    }

    /// Apply an engine answer, unless a newer request or screen change has
    /// superseded it.
    pub fn complete_analysis(&mut self, finished: FinishedAnalysis) -> AnalysisOutcome {
        if finished.ticket != self.state.latest_ticket {
            tracing::debug!(
                ticket = finished.ticket,
                latest = self.state.latest_ticket,
                "discarding superseded analysis"
            );
            return AnalysisOutcome::Superseded;
        }

        let scores = match finished.reply {
            Ok(Some(scores)) => scores,
            Ok(None) => {
                let back_to = match finished.kind {
                    SourceKind::Live => Screen::Camera,
                    SourceKind::Still => Screen::Welcome,
                };
                self.set_screen(back_to);
                self.notify(messages::NO_FACE, Severity::Info);
                return AnalysisOutcome::NoFace;
            }
            Err(e) => return self.fail(finished.kind, &AnalysisError::from(e)),
        };

        let Some(dominant) = scores.dominant().map(|d| d.key.clone()) else {
            return self.fail(finished.kind, &AnalysisError::EmptyScores);
        };

        let image = match finished.display {
            Display::File(path) => ResultImage::File { path },
            Display::Frame(frame) => match ResultImage::snapshot(&frame) {
                Ok(image) => image,
                Err(e) => return self.fail(finished.kind, &AnalysisError::from(e)),
            },
        };

        let view = render::render(&mut self.state.session, image, &dominant, &scores);
        self.surface.show_results(&view);
        self.set_screen(Screen::Results);
        AnalysisOutcome::Rendered(Box::new(view))
    }

    fn fail(&mut self, kind: SourceKind, error: &AnalysisError) -> AnalysisOutcome {
        tracing::warn!(?kind, %error, "analysis failed");
        self.set_screen(Screen::Welcome);
        self.notify(messages::TECHNICAL_ERROR, Severity::Error);
        AnalysisOutcome::Failed
    }
}
