//! Ingestion error types
//!
//! Only [`IngestError::Config`] and [`IngestError::Directory`] end a run;
//! [`ExportRouter::run`](crate::router::ExportRouter::run) returns them.
//! Everything else is scoped to one archive, entry, or (entry, parser)
//! pairing and is logged by the router before it moves on.

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot read export directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open archive {path}: {source}")]
    Archive {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Cannot read entry {path}: {source}")]
    EntryRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Short read on {path}: declared {declared} bytes, read {read}")]
    ShortRead { path: String, declared: u64, read: u64 },

    #[error("Unexpected entry layout {path}: expected {expected} path segments, found {found}")]
    EntryLayout {
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Missing field '{field}' in {path}")]
    MissingField { path: String, field: &'static str },

    #[error("Invalid date '{value}' in {path}: {source}")]
    Date {
        path: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Device registry error: {0}")]
    Registry(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn config(message: impl Into<String>) -> Self {
        IngestError::Config(message.into())
    }
}
