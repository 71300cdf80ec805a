//! Inference collaborator boundary

use thiserror::Error;
use tracing::debug;

use crate::error::{CycleError, Result};
use crate::signal::PixelSignal;
use crate::types::RawDetection;

/// Non-OK status reported by a classifier
#[derive(Debug, Clone, Error)]
#[error("classifier status {code}: {message}")]
pub struct ClassifierError {
    pub code: i32,
    pub message: String,
}

impl ClassifierError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Inference collaborator: pulls pixels from the signal, returns raw boxes
/// in model-resolution coordinates.
pub trait Classifier: Send {
    fn classify(
        &mut self,
        signal: &PixelSignal<'_>,
    ) -> std::result::Result<Vec<RawDetection>, ClassifierError>;
}

/// Calls the classifier and maps its status into the cycle error space
pub struct InferenceInvoker {
    classifier: Box<dyn Classifier>,
}

impl InferenceInvoker {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn invoke(&mut self, signal: &PixelSignal<'_>) -> Result<Vec<RawDetection>> {
        let raw = self
            .classifier
            .classify(signal)
            .map_err(|e| CycleError::Inference {
                code: e.code,
                message: e.message,
            })?;

        for det in &raw {
            debug!(
                "  {} ({:.3}) [x: {}, y: {}, w: {}, h: {}]",
                det.label, det.confidence, det.bbox.x, det.bbox.y, det.bbox.width, det.bbox.height
            );
        }
        Ok(raw)
    }
}
