//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use zip::write::SimpleFileOptions;

pub const HEART_ENTRY: &str = "fitbit_intraday_activities_heart/P001/2023-01-01.json";
pub const SLEEP_ENTRY: &str = "fitbit_sleep_logs/part-00000";

pub const HEART_COLLECTION: &str = "intraday_heartrate";
pub const SLEEP_COLLECTION: &str = "fitbit_sleep";
pub const LEDGER_COLLECTION: &str = "processed";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mdh_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Write a zip named `name` into `dir` holding `entries` in order
pub fn write_export(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut writer = zip::ZipWriter::new(File::create(&path)?);

    for (entry_name, data) in entries {
        writer.start_file(*entry_name, SimpleFileOptions::default())?;
        writer.write_all(data)?;
    }
    writer.finish()?;

    Ok(path)
}

/// Two heart-rate samples on 2023-01-01
pub fn heart_rate_body() -> Vec<u8> {
    serde_json::json!({
        "activities-heart": [{"dateTime": "2023-01-01", "value": {"restingHeartRate": 61}}],
        "activities-heart-intraday": {
            "dataset": [
                {"time": "00:00:00", "value": 64},
                {"time": "00:01:00", "value": 66}
            ],
            "datasetInterval": 1,
            "datasetType": "minute"
        }
    })
    .to_string()
    .into_bytes()
}

/// Header plus two sleep stage rows
pub fn sleep_body() -> &'static [u8] {
    b"participantID,logDate,type,startDate,endDate,value\n\
      P001,2023-01-01T00:00:00,light,2023-01-01T23:10:00,2023-01-01T23:40:00,30\n\
      P001,2023-01-01T00:00:00,deep,2023-01-01T23:40:00,2023-01-02T00:05:00,25\n"
}
