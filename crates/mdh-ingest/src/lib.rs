//! MDH Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Idempotent ingestion of MyDataHelps wearable exports.
//!
//! Exports arrive as zip archives in a directory. Each run scans the
//! directory, hands every archive entry to the device parsers that
//! recognize it, writes the normalized records to a document store and
//! records the (entry, parser) pairing in a processed ledger so the next
//! run skips it.
//!
//! # Supported Devices
//!
//! - **Fitbit intraday heart rate**: one JSON file per participant and day
//! - **Fitbit sleep logs**: comma-separated sleep stage rows
//!
//! # Example
//!
//! ```no_run
//! use mdh_ingest::{DeviceRegistry, DocumentLedger, ExportRouter, IngestConfig, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load(None)?;
//!     let registry = DeviceRegistry::from_config(&config.devices)?;
//!     let store = MemoryStore::new();
//!     let ledger = DocumentLedger::new(&store, &config.ledger.collection);
//!
//!     let summary = ExportRouter::new(&config.ledger)
//!         .run(&config.export_dir, &registry, &ledger, &store)
//!         .await?;
//!     println!("{} records written", summary.records_written);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod devices;
pub mod error;
pub mod ledger;
pub mod router;
pub mod store;

pub use config::IngestConfig;
pub use devices::{DeviceParser, DeviceRegistry, NormalizedRecord};
pub use error::{IngestError, Result};
pub use ledger::{DocumentLedger, LedgerEntry, ProcessedLedger};
pub use router::{ExportRouter, RunSummary};
pub use store::{DocumentStore, MemoryStore, PgDocumentStore, StoreError};
