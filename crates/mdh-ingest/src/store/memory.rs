//! In-process document store

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use super::{filter_fields, DocumentStore, InsertOutcome, StoreError};

/// Collections held in memory for dry runs and tests
///
/// Individual collections can be switched into a failing mode to exercise
/// error paths.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
    failing_inserts: Mutex<HashSet<String>>,
    failing_lookups: Mutex<HashSet<String>>,
    insert_calls: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert into `collection` fail until cleared
    pub async fn fail_inserts(&self, collection: &str) {
        self.failing_inserts.lock().await.insert(collection.to_string());
    }

    /// Make every lookup in `collection` fail until cleared
    pub async fn fail_lookups(&self, collection: &str) {
        self.failing_lookups.lock().await.insert(collection.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing_inserts.lock().await.clear();
        self.failing_lookups.lock().await.clear();
    }

    /// Snapshot of a collection's documents in insertion order
    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Number of successful `insert_batch` calls, across all collections
    pub async fn insert_calls(&self) -> usize {
        *self.insert_calls.lock().await
    }
}

fn matches(document: &Value, filter: &serde_json::Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_batch(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<InsertOutcome, StoreError> {
        if self.failing_inserts.lock().await.contains(collection) {
            return Err(StoreError::Unavailable(format!(
                "inserts into '{}' are failing",
                collection
            )));
        }

        let submitted = documents.len();
        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        *self.insert_calls.lock().await += 1;

        Ok(InsertOutcome {
            submitted,
            accepted: submitted,
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Value,
    ) -> Result<Option<Value>, StoreError> {
        let fields = filter_fields(filter)?;
        if self.failing_lookups.lock().await.contains(collection) {
            return Err(StoreError::Unavailable(format!(
                "lookups in '{}' are failing",
                collection
            )));
        }

        Ok(self
            .collections
            .lock()
            .await
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| matches(doc, fields)))
            .cloned())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
