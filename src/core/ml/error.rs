use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load weights from {path}: {reason}")]
    LoadWeights { path: String, reason: String },
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
    #[error("inference runtime error: {0}")]
    Runtime(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    pub fn load_weights(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadWeights {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    pub fn runtime(reason: impl Into<String>) -> Self {
        Self::Runtime(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_weights_message() {
        let err = ModelError::load_weights("defect.json", "file corrupted");
        assert!(err.to_string().contains("defect.json"));
        assert!(err.to_string().contains("file corrupted"));
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = ModelError::shape_mismatch("7", "5");
        assert_eq!(err.to_string(), "shape mismatch: expected 7, got 5");
    }
}
