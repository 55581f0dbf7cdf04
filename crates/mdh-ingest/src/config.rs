//! Configuration management
//!
//! Layers, lowest precedence first:
//!
//! 1. Built-in defaults (the constants below)
//! 2. An optional config file; JSON or TOML, picked by extension
//! 3. `MDH_*` environment variables, `__` separating nested keys
//!    (`MDH_EXPORT_DIR`, `MDH_DATABASE__URL`, `MDH_DEVICES__SLEEP__ENABLED`)
//!
//! A `.env` file in the working directory is loaded first, if present.

use ::config::{Config, ConfigError, Environment, File};
use mdh_common::{MdhError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::devices::{heart_rate, sleep};

// ============================================================================
// Defaults
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/mydatahelps";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Collection holding the processed ledger.
pub const DEFAULT_LEDGER_COLLECTION: &str = "processed";

/// Attempts made to write one ledger entry before giving up.
pub const DEFAULT_LEDGER_RECORD_ATTEMPTS: u32 = 3;

/// Pause between ledger write attempts.
pub const DEFAULT_LEDGER_RETRY_DELAY_MS: u64 = 500;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MDH";

/// Top-level ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory holding the exported `.zip` files
    pub export_dir: PathBuf,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub devices: DevicesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Apply bundled migrations after connecting
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Only the default collection is covered by the unique index in the
    /// bundled migration.
    pub collection: String,
    pub record_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    pub heart_rate: DeviceConfig,
    pub sleep: DeviceConfig,
}

/// Per-device switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub enabled: bool,
    /// Substring that identifies the device's entries inside an archive
    pub file_tag: String,
    /// Collection the normalized records go to
    pub collection: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::new(),
            database: DatabaseConfig::default(),
            ledger: LedgerConfig::default(),
            devices: DevicesConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            run_migrations: true,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_LEDGER_COLLECTION.to_string(),
            record_attempts: DEFAULT_LEDGER_RECORD_ATTEMPTS,
            retry_delay_ms: DEFAULT_LEDGER_RETRY_DELAY_MS,
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            heart_rate: DeviceConfig {
                enabled: true,
                file_tag: heart_rate::DEFAULT_FILE_TAG.to_string(),
                collection: heart_rate::DEFAULT_COLLECTION.to_string(),
            },
            sleep: DeviceConfig {
                enabled: true,
                file_tag: sleep::DEFAULT_FILE_TAG.to_string(),
                collection: sleep::DEFAULT_COLLECTION.to_string(),
            },
        }
    }
}

impl IngestConfig {
    /// Load defaults, then `path` (if given), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::try_from(&Self::default()).map_err(config_error)?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .map_err(config_error)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// An empty `export_dir` is allowed here; the router rejects it when a
    /// run starts, so other commands still work without one.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(MdhError::config("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(MdhError::config("Database max_connections must be greater than 0"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(MdhError::config(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.ledger.collection.is_empty() {
            return Err(MdhError::config("Ledger collection cannot be empty"));
        }

        if self.ledger.record_attempts == 0 {
            return Err(MdhError::config("Ledger record_attempts must be at least 1"));
        }

        for (name, device) in [("heart_rate", &self.devices.heart_rate), ("sleep", &self.devices.sleep)] {
            if device.file_tag.is_empty() || device.collection.is_empty() {
                return Err(MdhError::config(format!(
                    "Device '{}' needs a non-empty file_tag and collection",
                    name
                )));
            }
        }

        if self.ledger.collection != DEFAULT_LEDGER_COLLECTION {
            tracing::warn!(
                collection = %self.ledger.collection,
                "Custom ledger collection is not covered by the unique ledger index"
            );
        }

        Ok(())
    }
}

fn config_error(err: ConfigError) -> MdhError {
    MdhError::config(err.to_string())
}
