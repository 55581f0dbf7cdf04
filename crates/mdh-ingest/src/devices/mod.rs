//! Device parsers and the registry the router dispatches through
//!
//! Each wearable data format gets one [`DeviceParser`]. The router only ever
//! talks to the trait, so supporting a new export file means writing a parser
//! and registering it; the router does not change.

pub mod heart_rate;
pub mod sleep;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::archive::ArchiveEntry;
use crate::config::DevicesConfig;
use crate::error::{IngestError, Result};

pub use heart_rate::HeartRateParser;
pub use sleep::SleepParser;

/// Field holding the participant id in every normalized record
pub const PARTICIPANT_ID_FIELD: &str = "participantID";

/// Recognizes and normalizes one vendor file format
///
/// `name()` is half of the processed-ledger key. Renaming a parser makes
/// every entry it has already ingested look new, so treat a rename as a
/// breaking change for existing databases.
pub trait DeviceParser: Send + Sync {
    /// Stable identifier stored in the ledger
    fn name(&self) -> &str;

    /// Collection the normalized records are written to
    fn collection(&self) -> &str;

    /// Whether this parser understands the entry at `entry_path`
    fn recognize(&self, entry_path: &str) -> bool;

    /// Turn the entry bytes into records
    ///
    /// An `Err` leaves the (entry, parser) pairing unprocessed so a later run
    /// retries it. Problems with a single row or sample should be logged and
    /// skipped instead.
    fn transform(&self, entry: &ArchiveEntry) -> Result<Vec<NormalizedRecord>>;
}

/// Flat field -> scalar mapping ready for a bulk write
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRecord(Map<String, Value>);

impl NormalizedRecord {
    /// Serialize a parser's row type into a record
    ///
    /// Fails when the value does not serialize to a JSON object.
    pub fn from_serialize<T: Serialize>(row: &T) -> serde_json::Result<Self> {
        match serde_json::to_value(row)? {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "normalized record must be an object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_document(self) -> Value {
        Value::Object(self.0)
    }
}

/// Ordered set of installed parsers
///
/// Built once at startup and handed to the router by reference. Order is
/// the order parsers are offered each archive entry.
#[derive(Default)]
pub struct DeviceRegistry {
    parsers: Vec<Box<dyn DeviceParser>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default registry: heart rate first, then sleep, minus disabled devices
    pub fn from_config(config: &DevicesConfig) -> Result<Self> {
        let mut registry = Self::new();

        if config.heart_rate.enabled {
            registry.register(HeartRateParser::new(
                &config.heart_rate.file_tag,
                &config.heart_rate.collection,
            ))?;
        }
        if config.sleep.enabled {
            registry.register(SleepParser::new(&config.sleep.file_tag, &config.sleep.collection))?;
        }

        Ok(registry)
    }

    /// Append a parser; names must be unique because they key the ledger
    pub fn register(&mut self, parser: impl DeviceParser + 'static) -> Result<()> {
        if self.parsers.iter().any(|p| p.name() == parser.name()) {
            return Err(IngestError::Registry(format!(
                "a parser named '{}' is already registered",
                parser.name()
            )));
        }
        self.parsers.push(Box::new(parser));
        Ok(())
    }

    pub fn with_parser(mut self, parser: impl DeviceParser + 'static) -> Result<Self> {
        self.register(parser)?;
        Ok(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn DeviceParser + 'static)> {
        self.parsers.iter().map(|p| p.as_ref())
    }

    /// Parsers that recognize `entry_path`, in registry order
    pub fn matching<'a>(
        &'a self,
        entry_path: &'a str,
    ) -> impl Iterator<Item = &'a (dyn DeviceParser + 'static)> {
        self.iter().filter(move |p| p.recognize(entry_path))
    }

    pub fn names(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
