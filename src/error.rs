//! Error types for the classification core

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading a classifier or serving a prediction.
///
/// Low confidence is deliberately absent here: it is a `warning` status on
/// an otherwise successful prediction, not a failure.
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Model weights were not found at load time
    #[error("Model not found at: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// Model weights exist but could not be deserialized into a session
    #[error("Failed to load model from {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    /// Image could not be opened, decoded or resized
    #[error("Failed to decode image {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// ONNX Runtime could not be initialized
    #[error("Inference runtime unavailable: {0}")]
    Runtime(String),

    /// Neither the requested nor the default model is configured
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The inference runtime failed or returned an unusable output
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClassifierError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable kind, used as a metrics and log label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactMissing(_) => "artifact_missing",
            Self::ModelLoad { .. } => "model_load",
            Self::Decode { .. } => "decode",
            Self::Runtime(_) => "runtime",
            Self::UnknownModel(_) => "unknown_model",
            Self::Inference(_) => "inference",
            Self::Io(_) => "io",
        }
    }
}

/// Convenience result type for classification operations
pub type Result<T> = std::result::Result<T, ClassifierError>;
