//! FER+ facial expression classifier via ONNX Runtime.
//!
//! Crops the detected face, converts it to a 64×64 grayscale patch and turns
//! the model's eight logits into per-category confidences.

use crate::types::{ExpressionScores, FaceBox};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FERPLUS_INPUT_SIZE: u32 = 64;
/// Fraction of the face box added on each side before cropping.
const FACE_MARGIN: f32 = 0.1;

/// Output categories in model order.
pub const FERPLUS_KEYS: [&str; 8] = [
    "neutral",
    "happy",
    "surprised",
    "sad",
    "angry",
    "disgusted",
    "fearful",
    "contempt",
];

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("expression model not found: {0}")]
    ModelNotFound(String),
    #[error("expression classification failed: {0}")]
    InferenceFailed(String),
    #[error("face box lies outside the image")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FER+ expression classifier.
pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self { session })
    }

    /// Classify the expression of one detected face.
    pub fn classify(
        &mut self,
        image: &RgbImage,
        face: &FaceBox,
    ) -> Result<ExpressionScores, ClassifierError> {
        let patch = crop_face(image, face).ok_or(ClassifierError::EmptyCrop)?;
        let input = preprocess(&patch);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("logits: {e}")))?;

        if logits.len() != FERPLUS_KEYS.len() {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {} logits, got {}",
                FERPLUS_KEYS.len(),
                logits.len()
            )));
        }

        Ok(ExpressionScores::from_pairs(
            FERPLUS_KEYS.iter().copied().zip(softmax(logits)),
        ))
    }
}

/// Crop the face (plus margin) and scale it to the model's grayscale input.
///
/// Returns `None` when the box does not intersect the image.
fn crop_face(image: &RgbImage, face: &FaceBox) -> Option<GrayImage> {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let mx = face.width * FACE_MARGIN;
    let my = face.height * FACE_MARGIN;

    let x0 = (face.x - mx).clamp(0.0, w);
    let y0 = (face.y - my).clamp(0.0, h);
    let x1 = (face.x + face.width + mx).clamp(0.0, w);
    let y1 = (face.y + face.height + my).clamp(0.0, h);

    let cw = (x1 - x0).floor() as u32;
    let ch = (y1 - y0).floor() as u32;
    if cw == 0 || ch == 0 {
        return None;
    }

    let crop = imageops::crop_imm(image, x0 as u32, y0 as u32, cw, ch).to_image();
    let gray = DynamicImage::ImageRgb8(crop).to_luma8();
    Some(imageops::resize(
        &gray,
        FERPLUS_INPUT_SIZE,
        FERPLUS_INPUT_SIZE,
        FilterType::Triangle,
    ))
}

/// FER+ takes raw 0–255 intensities, NCHW with a single channel.
fn preprocess(patch: &GrayImage) -> Array4<f32> {
    let size = FERPLUS_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
    for (x, y, pixel) in patch.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
    }
    tensor
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}
