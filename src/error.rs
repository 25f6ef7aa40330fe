//! Error types for audionet

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to decode {source_id}: {message}")]
    Decode { source_id: String, message: String },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// Build a decode error for a named source
    pub fn decode(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Build a shape error from two shapes
    pub fn shape(expected: &[usize], got: &[usize]) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
