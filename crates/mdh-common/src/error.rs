//! Error types shared across MDH crates

use thiserror::Error;

/// Result type alias for MDH operations
pub type Result<T> = std::result::Result<T, MdhError>;

/// Errors that are not specific to a single pipeline stage
#[derive(Error, Debug)]
pub enum MdhError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup error: {0}")]
    Logging(String),
}

impl MdhError {
    pub fn config(message: impl Into<String>) -> Self {
        MdhError::Config(message.into())
    }
}
