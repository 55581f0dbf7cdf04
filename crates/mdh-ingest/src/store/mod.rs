//! Document store the pipeline writes into
//!
//! The pipeline needs three things from a database: bulk insert of JSON
//! documents into a named collection, a single-document lookup by field
//! equality, and an orderly shutdown. [`DocumentStore`] is that seam.
//! [`PgDocumentStore`] is the production backend; [`MemoryStore`] backs dry
//! runs and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a bulk insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOutcome {
    pub submitted: usize,
    pub accepted: usize,
}

impl InsertOutcome {
    /// True when the store kept fewer documents than it was given
    pub fn is_partial(&self) -> bool {
        self.accepted < self.submitted
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `documents` into `collection` in one batch
    async fn insert_batch(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<InsertOutcome, StoreError>;

    /// First document in `collection` whose top-level fields equal every
    /// field of `filter`
    ///
    /// `Ok(None)` means nothing matched; `Err` means the lookup itself failed.
    async fn find_one(&self, collection: &str, filter: &Value)
        -> Result<Option<Value>, StoreError>;

    /// Release connections; the store must not be used afterwards
    async fn disconnect(&self) -> Result<(), StoreError>;
}

/// Reject filters that are not JSON objects
pub(crate) fn filter_fields(filter: &Value) -> Result<&serde_json::Map<String, Value>, StoreError> {
    filter
        .as_object()
        .ok_or_else(|| StoreError::InvalidFilter(format!("expected an object, got {}", filter)))
}
