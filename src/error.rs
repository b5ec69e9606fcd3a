//! Error types for canopy

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for canopy operations
pub type Result<T> = std::result::Result<T, CanopyError>;

/// Main error type for canopy.
///
/// Every variant is raised by the component that detects it and surfaced
/// verbatim by the shell as the failing command's output.
#[derive(Error, Debug)]
pub enum CanopyError {
    #[error("File not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Argument format error: {0}")]
    ArgumentFormatError(String),

    #[error("Duplicate parameter: '{0}' was given more than once")]
    DuplicateParameterError(String),

    #[error("Unrecognized parameter '{name}': {reason}")]
    UnrecognizedParameterError { name: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Column '{0}' is not present in the dataset; set the target with 'targetcolumn'")]
    MissingColumnError(String),

    #[error("Invalid extension: {} (expected .{expected})", path.display())]
    InvalidExtensionError { path: PathBuf, expected: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    /// Shell usage error, already rendered by the command parser
    #[error("{0}")]
    UsageError(String),
}

impl CanopyError {
    /// Shorthand for a rejected parameter key or value.
    pub fn unrecognized(name: impl Into<String>, reason: impl Into<String>) -> Self {
        CanopyError::UnrecognizedParameterError {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for CanopyError {
    fn from(err: polars::error::PolarsError) -> Self {
        CanopyError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for CanopyError {
    fn from(err: serde_json::Error) -> Self {
        CanopyError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for CanopyError {
    fn from(err: bincode::Error) -> Self {
        CanopyError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for CanopyError {
    fn from(err: ndarray::ShapeError) -> Self {
        CanopyError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
