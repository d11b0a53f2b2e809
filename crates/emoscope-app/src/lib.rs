//! emoscope-app — Application layer.
//!
//! Model loading, the screen state machine, notifications, results rendering
//! and the analysis orchestrator that ties them to the camera and the
//! inference engine. Presentation goes through the [`Surface`] trait.

pub mod app;
pub mod config;
pub mod engine;
pub mod loader;
pub mod notify;
pub mod render;
pub mod screen;
pub mod surface;

#[cfg(test)]
mod testing;

pub use app::{AnalysisOutcome, AnalysisSource, App, AppState, PendingAnalysis, StillImage};
pub use config::Config;
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use loader::{LoadError, ModelLoader, ModelSource};
pub use notify::{Severity, Toast};
pub use render::{ResultImage, ResultsView};
pub use screen::Screen;
pub use surface::Surface;
