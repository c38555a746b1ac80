use thiserror::Error;

use crate::core::ml::error::ModelError;

#[derive(Debug, Error)]
pub enum InspectionError {
    /// Device unavailable, permission denied, in use, or no frame readable at open.
    #[error("capture source could not be opened: {0}")]
    Open(String),
    /// Device disconnected or stopped delivering frames mid-run.
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("frame source exhausted")]
    EndOfStream,
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("inspection worker failed: {0}")]
    Worker(String),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl InspectionError {
    /// Errors that end the run; everything else is scoped to a single frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InspectionError::Open(_)
                | InspectionError::Read(_)
                | InspectionError::Io(_)
                | InspectionError::Worker(_)
        )
    }
}
