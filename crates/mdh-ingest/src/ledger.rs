//! Processed ledger
//!
//! One document per (archive entry path, parser name) that has been
//! transformed and written successfully:
//!
//! ```json
//! { "file": "fitbit_intraday_activities_heart/P001/2023-01-01.json",
//!   "module": "FitbitActivityHeartRate",
//!   "date": "2024-03-02T10:15:00Z" }
//! ```
//!
//! Entries are only ever added. A missing entry means the pairing must be
//! (re)processed on the next run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::store::{DocumentStore, StoreError};

pub const FILE_FIELD: &str = "file";
pub const MODULE_FIELD: &str = "module";
pub const DATE_FIELD: &str = "date";

/// A recorded (entry, parser) completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub file: String,
    pub module: String,
    /// `None` when the stored date is missing or unreadable
    pub date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ProcessedLedger: Send + Sync {
    /// The ledger entry for this pairing, if one exists
    ///
    /// `Ok(None)` means "not processed"; `Err` means the lookup failed and
    /// nothing is known either way.
    async fn lookup(
        &self,
        entry_path: &str,
        parser_name: &str,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    async fn exists(&self, entry_path: &str, parser_name: &str) -> Result<bool, StoreError> {
        Ok(self.lookup(entry_path, parser_name).await?.is_some())
    }

    /// Mark the pairing as processed at `completed_at`
    async fn record(
        &self,
        entry_path: &str,
        parser_name: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Ledger kept as documents in a [`DocumentStore`] collection
pub struct DocumentLedger<'s> {
    store: &'s dyn DocumentStore,
    collection: String,
}

impl<'s> DocumentLedger<'s> {
    pub fn new(store: &'s dyn DocumentStore, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl ProcessedLedger for DocumentLedger<'_> {
    async fn lookup(
        &self,
        entry_path: &str,
        parser_name: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let filter = json!({ FILE_FIELD: entry_path, MODULE_FIELD: parser_name });
        let Some(document) = self.store.find_one(&self.collection, &filter).await? else {
            return Ok(None);
        };

        let date = document
            .get(DATE_FIELD)
            .cloned()
            .and_then(|value: Value| serde_json::from_value(value).ok());

        Ok(Some(LedgerEntry {
            file: entry_path.to_string(),
            module: parser_name.to_string(),
            date,
        }))
    }

    async fn record(
        &self,
        entry_path: &str,
        parser_name: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry = LedgerEntry {
            file: entry_path.to_string(),
            module: parser_name.to_string(),
            date: Some(completed_at),
        };
        let outcome = self
            .store
            .insert_batch(&self.collection, vec![serde_json::to_value(&entry)?])
            .await?;

        if outcome.accepted == 0 {
            // Unique index hit: another run recorded this pairing first.
            debug!(component = "ledger", entry = %entry_path, parser = %parser_name, "Ledger entry already present");
        }
        Ok(())
    }
}

/// Record a pairing, retrying up to `attempts` times in total
///
/// Returns the last error when every attempt fails.
pub async fn record_with_retry(
    ledger: &dyn ProcessedLedger,
    entry_path: &str,
    parser_name: &str,
    attempts: u32,
    delay: Duration,
) -> Result<(), StoreError> {
    let completed_at = Utc::now();
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match ledger.record(entry_path, parser_name, completed_at).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                warn!(
                    component = "ledger",
                    entry = %entry_path,
                    parser = %parser_name,
                    attempt,
                    error = %e,
                    "Ledger write failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const ENTRY: &str = "fitbit_sleep_logs/part-00000";

    #[tokio::test]
    async fn test_lookup_before_and_after_record() {
        let store = MemoryStore::new();
        let ledger = DocumentLedger::new(&store, "processed");

        assert!(!ledger.exists(ENTRY, "FitbitSleep").await.unwrap());

        let at = Utc::now();
        ledger.record(ENTRY, "FitbitSleep", at).await.unwrap();

        let entry = ledger.lookup(ENTRY, "FitbitSleep").await.unwrap().unwrap();
        assert_eq!(entry.module, "FitbitSleep");
        assert_eq!(entry.date.map(|d| d.timestamp()), Some(at.timestamp()));

        // Same path, different parser is a separate pairing
        assert!(!ledger.exists(ENTRY, "FitbitActivityHeartRate").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_date_still_counts_as_processed() {
        let store = MemoryStore::new();
        store
            .insert_batch(
                "processed",
                vec![json!({"file": ENTRY, "module": "FitbitSleep", "date": 1_700_000_000})],
            )
            .await
            .unwrap();

        let entry = DocumentLedger::new(&store, "processed")
            .lookup(ENTRY, "FitbitSleep")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.date, None);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_error_not_none() {
        let store = MemoryStore::new();
        store.fail_lookups("processed").await;

        let result = DocumentLedger::new(&store, "processed").lookup(ENTRY, "FitbitSleep").await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_with_retry_gives_up() {
        let store = MemoryStore::new();
        store.fail_inserts("processed").await;
        let ledger = DocumentLedger::new(&store, "processed");

        let result =
            record_with_retry(&ledger, ENTRY, "FitbitSleep", 3, Duration::from_millis(100)).await;

        assert!(result.is_err());
        assert_eq!(store.count("processed").await, 0);
    }
}
