//! emoscope-core — Expression scoring and inference.
//!
//! Face detection (SCRFD) and expression classification (FER+) run via ONNX
//! Runtime. This crate also owns the emotion descriptor table and the logic
//! that turns raw scores into a dominant category and a percentage chart.

pub mod chart;
pub mod classifier;
pub mod descriptor;
pub mod detector;
pub mod expression;
pub mod types;

use std::path::PathBuf;

pub use chart::{build_chart, ChartBar};
pub use descriptor::EmotionDescriptor;
pub use expression::{ExpressionDetector, InferenceError, OnnxExpressionDetector};
pub use types::{ExpressionScore, ExpressionScores, FaceBox};

/// Default local model directory: `$XDG_DATA_HOME/emoscope/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("emoscope")
        .join("models")
}
