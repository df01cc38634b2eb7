use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Error taxonomy for the capture-classify-persist pipeline.
///
/// Only `PermissionDenied`, `CaptureFailure`, `Busy`, `InvalidState` and
/// `Persistence` are surfaced to the presentation layer. Classifier
/// failures (`ModelUnavailable`, `Inference`) are absorbed by the
/// fallback path, and `ArtifactIo` never blocks entry creation.
#[derive(Debug, Error, Serialize)]
pub enum AppError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("capture failed: {0}")]
    CaptureFailure(String),

    #[error("a capture cycle is already in flight")]
    Busy,

    #[error("operation not valid in state {0}")]
    InvalidState(&'static str),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("artifact io failure: {0}")]
    ArtifactIo(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable kind tag for event reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::PermissionDenied => "permission_denied",
            AppError::CaptureFailure(_) => "capture_failure",
            AppError::Busy => "busy",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Persistence(_) => "persistence_failure",
            AppError::ArtifactIo(_) => "artifact_io_failure",
            AppError::NotFound(_) => "not_found",
            AppError::ModelUnavailable(_) => "model_unavailable",
            AppError::Inference(_) => "inference_error",
            AppError::Config(_) => "config_error",
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}
