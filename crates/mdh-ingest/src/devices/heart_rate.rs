//! Fitbit intraday heart rate
//!
//! Entries live at `<tag>/<participant id>/<file>.json`. Each file is one
//! Fitbit API response:
//!
//! ```json
//! {
//!   "activities-heart": [{ "dateTime": "2023-01-01", "value": { ... } }],
//!   "activities-heart-intraday": {
//!     "dataset": [{ "time": "00:00:05", "value": 72 }],
//!     "datasetInterval": 1
//!   }
//! }
//! ```
//!
//! Samples only carry a time of day. The calendar date comes from the last
//! `activities-heart` item, so a file is assumed to cover exactly one day.
//! Both parts are read as UTC wall-clock values.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{DeviceParser, NormalizedRecord};
use crate::archive::ArchiveEntry;
use crate::error::{IngestError, Result};

pub const DEFAULT_FILE_TAG: &str = "fitbit_intraday_activities_heart";
pub const DEFAULT_COLLECTION: &str = "intraday_heartrate";
pub const PARSER_NAME: &str = "FitbitActivityHeartRate";

/// `<tag>/<participant id>/<file>`
const PATH_SEGMENTS: usize = 3;

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Fractions are accepted and truncated
const TIME_FORMAT: &str = "%H:%M:%S%.f";

#[derive(Debug, Deserialize)]
struct HeartRateExport {
    #[serde(rename = "activities-heart")]
    summary: Vec<DailySummary>,
    #[serde(rename = "activities-heart-intraday")]
    intraday: Intraday,
}

#[derive(Debug, Deserialize)]
struct DailySummary {
    #[serde(rename = "dateTime")]
    date_time: String,
}

#[derive(Debug, Deserialize)]
struct Intraday {
    dataset: Vec<IntradaySample>,
}

#[derive(Debug, Deserialize)]
struct IntradaySample {
    time: String,
    value: f64,
}

/// One stored heart rate sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartRateRecord {
    #[serde(rename = "participantID")]
    pub participant_id: String,
    /// Unix seconds, UTC
    #[serde(rename = "time")]
    pub timestamp: i64,
    #[serde(rename = "hr")]
    pub heart_rate: f64,
}

/// Parser for `fitbit_intraday_activities_heart` entries
#[derive(Debug, Clone)]
pub struct HeartRateParser {
    file_tag: String,
    collection: String,
}

impl HeartRateParser {
    pub fn new(file_tag: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            file_tag: file_tag.into(),
            collection: collection.into(),
        }
    }

    /// Participant id from `<tag>/<participant id>/<file>`
    fn participant_id(path: &str) -> Result<&str> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != PATH_SEGMENTS {
            return Err(IngestError::EntryLayout {
                path: path.to_string(),
                expected: PATH_SEGMENTS,
                found: segments.len(),
            });
        }
        Ok(segments[1])
    }

    /// Unix seconds at 00:00:00 UTC of the file's calendar day
    fn day_start(path: &str, summary: &[DailySummary]) -> Result<i64> {
        let last = summary.last().ok_or_else(|| IngestError::MissingField {
            path: path.to_string(),
            field: "activities-heart[].dateTime",
        })?;

        let distinct: BTreeSet<&str> = summary.iter().map(|s| s.date_time.as_str()).collect();
        if distinct.len() > 1 {
            warn!(
                component = "heart_rate",
                entry = %path,
                dates = distinct.len(),
                using = %last.date_time,
                "Multi-day heart rate file; every sample is stamped with the last date"
            );
        }

        let date = NaiveDate::parse_from_str(&last.date_time, DATE_FORMAT).map_err(|source| {
            IngestError::Date {
                path: path.to_string(),
                value: last.date_time.clone(),
                source,
            }
        })?;

        Ok(date.and_time(NaiveTime::MIN).and_utc().timestamp())
    }
}

impl Default for HeartRateParser {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_TAG, DEFAULT_COLLECTION)
    }
}

impl DeviceParser for HeartRateParser {
    fn name(&self) -> &str {
        PARSER_NAME
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn recognize(&self, entry_path: &str) -> bool {
        entry_path.contains(&self.file_tag)
    }

    fn transform(&self, entry: &ArchiveEntry) -> Result<Vec<NormalizedRecord>> {
        let path = entry.path();
        let participant_id = Self::participant_id(path)?;

        let export: HeartRateExport =
            serde_json::from_slice(entry.data()).map_err(|source| IngestError::Json {
                path: path.to_string(),
                source,
            })?;

        let day_start = Self::day_start(path, &export.summary)?;
        let samples = export.intraday.dataset;
        info!(component = "heart_rate", entry = %path, samples = samples.len(), "Heart rate values found");

        let mut records = Vec::with_capacity(samples.len());
        for sample in samples {
            let offset = match NaiveTime::parse_from_str(&sample.time, TIME_FORMAT) {
                Ok(time) => i64::from(time.num_seconds_from_midnight()),
                Err(e) => {
                    warn!(component = "heart_rate", entry = %path, time = %sample.time, error = %e, "Sample dropped: bad time of day");
                    continue;
                },
            };

            let row = HeartRateRecord {
                participant_id: participant_id.to_string(),
                timestamp: day_start + offset,
                heart_rate: sample.value,
            };

            match NormalizedRecord::from_serialize(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(component = "heart_rate", entry = %path, error = %e, "Sample dropped: serialization failed");
                },
            }
        }

        debug!(component = "heart_rate", entry = %path, records = records.len(), "Transform complete");
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const ENTRY_PATH: &str = "fitbit_intraday_activities_heart/P001/2023-01-01.json";

    fn entry(path: &str, body: Value) -> ArchiveEntry {
        ArchiveEntry::new(path, serde_json::to_vec(&body).unwrap())
    }

    #[test]
    fn test_recognize_by_tag() {
        let parser = HeartRateParser::default();
        assert!(parser.recognize(ENTRY_PATH));
        assert!(!parser.recognize("fitbit_sleep_logs/part-0"));
    }

    #[test]
    fn test_single_sample_utc_timestamp() {
        let body = json!({
            "activities-heart": [{"dateTime": "2023-01-01"}],
            "activities-heart-intraday": {"dataset": [{"time": "00:00:05", "value": 72.0}]}
        });

        let records = HeartRateParser::default().transform(&entry(ENTRY_PATH, body)).unwrap();

        assert_eq!(records.len(), 1);
        // 2023-01-01T00:00:05Z
        assert_eq!(records[0].get("time"), Some(&json!(1_672_531_205_i64)));
        assert_eq!(records[0].get("hr"), Some(&json!(72.0)));
        assert_eq!(records[0].get("participantID"), Some(&json!("P001")));
    }

    #[test]
    fn test_last_summary_date_wins() {
        let body = json!({
            "activities-heart": [{"dateTime": "2023-01-01"}, {"dateTime": "2023-01-02"}],
            "activities-heart-intraday": {"dataset": [
                {"time": "23:59:59", "value": 60},
                {"time": "not-a-time", "value": 61}
            ]}
        });

        let records = HeartRateParser::default().transform(&entry(ENTRY_PATH, body)).unwrap();

        // 2023-01-02T23:59:59Z; the unparseable sample is dropped
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("time"), Some(&json!(1_672_703_999_i64)));
    }

    #[test]
    fn test_fractional_sample_time_truncated() {
        let body = json!({
            "activities-heart": [{"dateTime": "2023-01-01"}],
            "activities-heart-intraday": {"dataset": [{"time": "00:00:05.750", "value": 72}]}
        });

        let records = HeartRateParser::default().transform(&entry(ENTRY_PATH, body)).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("time"), Some(&json!(1_672_531_205_i64)));
    }

    #[test]
    fn test_two_segment_path_is_layout_error() {
        let body = json!({
            "activities-heart": [{"dateTime": "2023-01-01"}],
            "activities-heart-intraday": {"dataset": []}
        });

        let result = HeartRateParser::default()
            .transform(&entry("fitbit_intraday_activities_heart/2023-01-01.json", body));

        assert!(matches!(
            result,
            Err(IngestError::EntryLayout { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn test_missing_intraday_is_json_error() {
        let body = json!({"activities-heart": [{"dateTime": "2023-01-01"}]});
        let result = HeartRateParser::default().transform(&entry(ENTRY_PATH, body));
        assert!(matches!(result, Err(IngestError::Json { .. })));
    }

    #[test]
    fn test_empty_summary_is_missing_field() {
        let body = json!({
            "activities-heart": [],
            "activities-heart-intraday": {"dataset": [{"time": "00:00:05", "value": 72.0}]}
        });
        let result = HeartRateParser::default().transform(&entry(ENTRY_PATH, body));
        assert!(matches!(result, Err(IngestError::MissingField { .. })));
    }

    #[test]
    fn test_invalid_date_is_error() {
        let body = json!({
            "activities-heart": [{"dateTime": "01/01/2023"}],
            "activities-heart-intraday": {"dataset": []}
        });
        let result = HeartRateParser::default().transform(&entry(ENTRY_PATH, body));
        assert!(matches!(result, Err(IngestError::Date { .. })));
    }

    #[test]
    fn test_not_json_is_error() {
        let result = HeartRateParser::default().transform(&ArchiveEntry::new(ENTRY_PATH, "{{"));
        assert!(matches!(result, Err(IngestError::Json { .. })));
    }
}
