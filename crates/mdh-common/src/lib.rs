//! MDH Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the MyDataHelps export
//! ingestion workspace.
//!
//! # Example
//!
//! ```no_run
//! use mdh_common::logging::{init_logging, LogConfig, LogLevel};
//!
//! fn main() -> mdh_common::Result<()> {
//!     let config = LogConfig::builder()
//!         .level(LogLevel::Debug)
//!         .log_file_prefix("mdh-ingest")
//!         .build()
//!         .apply_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{MdhError, Result};
