//! Inference engine thread.
//!
//! ONNX inference is blocking, so the detector lives on a dedicated OS thread
//! and the async side talks to it through a bounded channel with one-shot
//! replies.

use emoscope_core::{ExpressionDetector, ExpressionScores, InferenceError};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of one detection request: `None` when no face was found.
pub type DetectionReply = Result<Option<ExpressionScores>, EngineError>;

struct DetectRequest {
    image: Arc<RgbImage>,
    reply: oneshot::Sender<DetectionReply>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<DetectRequest>,
}

impl EngineHandle {
    /// Queue a still image for detection; await the receiver for the result.
    pub async fn submit(&self, image: Arc<RgbImage>) -> Result<oneshot::Receiver<DetectionReply>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DetectRequest { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx)
    }

    /// Submit and wait for the result.
    pub async fn detect(&self, image: Arc<RgbImage>) -> DetectionReply {
        self.submit(image)
            .await?
            .await
            .map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread that owns `detector`.
///
/// The thread exits once every handle has been dropped.
pub fn spawn_engine(mut detector: Box<dyn ExpressionDetector>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<DetectRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("emoscope-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                let (width, height) = req.image.dimensions();
                let started = std::time::Instant::now();
                let result = detector.detect_single(&req.image).map_err(EngineError::from);
                tracing::debug!(
                    width,
                    height,
                    face = matches!(result, Ok(Some(_))),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "detection finished"
                );
                let _ = req.reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
