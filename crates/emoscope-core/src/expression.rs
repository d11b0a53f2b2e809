//! Single-face expression detection.
//!
//! [`ExpressionDetector`] is the seam between the application and the
//! inference backend: given a still RGB raster it returns the classification
//! scores of the most prominent face, or `None` when no face is found.

use crate::classifier::{ClassifierError, ExpressionClassifier};
use crate::detector::{DetectorError, FaceDetector};
use crate::types::ExpressionScores;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Detects at most one face and classifies its expression.
pub trait ExpressionDetector: Send {
    fn detect_single(&mut self, image: &RgbImage) -> Result<Option<ExpressionScores>, InferenceError>;
}

/// SCRFD detection followed by FER+ classification.
pub struct OnnxExpressionDetector {
    detector: FaceDetector,
    classifier: ExpressionClassifier,
}

impl OnnxExpressionDetector {
    /// Load both model bundles.
    pub fn load(detector_path: &Path, classifier_path: &Path) -> Result<Self, InferenceError> {
        let detector = FaceDetector::load(detector_path)?;
        let classifier = ExpressionClassifier::load(classifier_path)?;
        Ok(Self { detector, classifier })
    }
}

impl ExpressionDetector for OnnxExpressionDetector {
    fn detect_single(&mut self, image: &RgbImage) -> Result<Option<ExpressionScores>, InferenceError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.first() else {
            tracing::debug!("no face detected");
            return Ok(None);
        };

        tracing::debug!(
            confidence = face.confidence,
            candidates = faces.len(),
            "classifying most confident face"
        );
        let scores = self.classifier.classify(image, face)?;
        Ok(Some(scores))
    }
}
