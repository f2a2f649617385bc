//! Error Handling Module
//!
//! Defines the error taxonomy for the fine-tuning pipeline.
//! Every variant is fatal for a run: nothing is retried or skipped.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for cat/dog fine-tuning operations
#[derive(Error, Debug)]
pub enum CatDogError {
    /// Missing or malformed dataset directories, invalid hyperparameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// An image file could not be read or decoded
    #[error("Failed to decode image at '{}': {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Shape or type mismatch detected before handing a batch to the network
    #[error("Computation error: {0}")]
    Computation(String),

    /// Model record could not be saved or loaded
    #[error("Model error: {0}")]
    Model(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CatDogError {
    /// Build a decode error for `path`
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for CatDogError {
    fn from(err: serde_json::Error) -> Self {
        CatDogError::Serialization(err.to_string())
    }
}

/// Convenience Result type for cat/dog fine-tuning operations
pub type Result<T> = std::result::Result<T, CatDogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatDogError::Config("no class directories".to_string());
        assert_eq!(err.to_string(), "Configuration error: no class directories");
    }

    #[test]
    fn test_decode_error_names_path() {
        let err = CatDogError::decode("/data/cats/cat.1.jpg", "unexpected EOF");
        let msg = err.to_string();
        assert!(msg.contains("cat.1.jpg"));
        assert!(msg.contains("unexpected EOF"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CatDogError = io_err.into();
        assert!(matches!(err, CatDogError::Io(_)));
    }
}
