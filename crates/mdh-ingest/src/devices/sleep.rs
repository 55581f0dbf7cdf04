//! Fitbit sleep logs
//!
//! Unlike heart rate, sleep is exported as one comma-separated stream for all
//! participants:
//!
//! ```text
//! participantID,logDate,type,startDate,endDate,value
//! P001,2023-01-01T00:00:00,light,2023-01-01T23:10:00,2023-01-01T23:40:00,30
//! ```
//!
//! Rows with fewer than six fields are skipped. Date-times are UTC and may
//! carry fractional seconds (`2023-01-01T23:10:00.000`).

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{DeviceParser, NormalizedRecord};
use crate::archive::ArchiveEntry;
use crate::error::{IngestError, Result};

pub const DEFAULT_FILE_TAG: &str = "fitbit_sleep_logs";
pub const DEFAULT_COLLECTION: &str = "fitbit_sleep";
pub const PARSER_NAME: &str = "FitbitSleep";

const MIN_FIELDS: usize = 6;
/// `%.f` also accepts a missing fraction
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// First column of the optional header row
const HEADER_FIRST_COLUMN: &str = "participantID";

/// One stored sleep log row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepRecord {
    #[serde(rename = "participantID")]
    pub participant_id: String,
    #[serde(rename = "logDate")]
    pub log_date: DateTime<Utc>,
    #[serde(rename = "startDate")]
    pub start_date: DateTime<Utc>,
    #[serde(rename = "endDate")]
    pub end_date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl SleepRecord {
    /// Map a row positionally; `Err` carries the first date-time that does
    /// not parse
    fn from_row(row: &StringRecord) -> std::result::Result<Self, String> {
        let field = |index: usize| row.get(index).unwrap_or_default();
        let date_time =
            |index: usize| parse_date_time(field(index)).ok_or_else(|| field(index).to_string());

        Ok(Self {
            participant_id: field(0).to_string(),
            log_date: date_time(1)?,
            kind: field(2).to_string(),
            start_date: date_time(3)?,
            end_date: date_time(4)?,
            value: field(5).to_string(),
        })
    }
}

fn is_header(line: usize, row: &StringRecord) -> bool {
    line == 1
        && row
            .get(0)
            .is_some_and(|first| first.trim().eq_ignore_ascii_case(HEADER_FIRST_COLUMN))
}

fn parse_date_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parser for `fitbit_sleep_logs` entries
#[derive(Debug, Clone)]
pub struct SleepParser {
    file_tag: String,
    collection: String,
}

impl SleepParser {
    pub fn new(file_tag: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            file_tag: file_tag.into(),
            collection: collection.into(),
        }
    }
}

impl Default for SleepParser {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_TAG, DEFAULT_COLLECTION)
    }
}

impl DeviceParser for SleepParser {
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
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(entry.data());

        let mut records = Vec::new();
        let mut short_rows = 0usize;
        let mut dropped_rows = 0usize;

        for (index, row) in reader.records().enumerate() {
            let line = index + 1;
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => {
                    return Err(IngestError::Csv {
                        path: path.to_string(),
                        source: e,
                    });
                },
                Err(e) => {
                    warn!(component = "sleep", entry = %path, line, error = %e, "Row skipped: unreadable");
                    continue;
                },
            };

            if row.len() < MIN_FIELDS {
                short_rows += 1;
                continue;
            }

            let sleep = match SleepRecord::from_row(&row) {
                Ok(sleep) => sleep,
                Err(_) if is_header(line, &row) => {
                    debug!(component = "sleep", entry = %path, "Header row skipped");
                    continue;
                },
                Err(value) => {
                    warn!(
                        component = "sleep",
                        entry = %path,
                        line,
                        value = %value,
                        "Row dropped: unparseable date-time"
                    );
                    dropped_rows += 1;
                    continue;
                },
            };

            match NormalizedRecord::from_serialize(&sleep) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(component = "sleep", entry = %path, line, error = %e, "Row dropped: serialization failed");
                    dropped_rows += 1;
                },
            }
        }

        if short_rows > 0 {
            debug!(component = "sleep", entry = %path, short_rows, "Rows with fewer than 6 fields skipped");
        }
        info!(
            component = "sleep",
            entry = %path,
            records = records.len(),
            dropped = dropped_rows,
            "Sleep records found"
        );

        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const ENTRY_PATH: &str = "fitbit_sleep_logs/part-00000";

    fn transform(body: &str) -> Vec<NormalizedRecord> {
        SleepParser::default()
            .transform(&ArchiveEntry::new(ENTRY_PATH, body))
            .unwrap()
    }

    #[test]
    fn test_maps_fields_positionally() {
        let records = transform(
            "P001,2023-01-01T00:00:00,light,2023-01-01T23:10:00,2023-01-01T23:40:00,30\n",
        );

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.get("participantID"), Some(&json!("P001")));
        assert_eq!(record.get("logDate"), Some(&json!("2023-01-01T00:00:00Z")));
        assert_eq!(record.get("type"), Some(&json!("light")));
        assert_eq!(record.get("startDate"), Some(&json!("2023-01-01T23:10:00Z")));
        assert_eq!(record.get("endDate"), Some(&json!("2023-01-01T23:40:00Z")));
        assert_eq!(record.get("value"), Some(&json!("30")));
    }

    #[test]
    fn test_short_row_dropped_silently() {
        let records = transform("P001,2023-01-01T00:00:00,light,2023-01-01T23:10:00,30\n");
        assert!(records.is_empty());
    }

    #[test]
    fn test_header_and_mixed_rows() {
        let body = "participantID,logDate,type,startDate,endDate,value\n\
                    P001,2023-01-01T00:00:00,deep,2023-01-01T01:00:00,2023-01-01T01:20:00,20\n\
                    P002,2023-01-01T00:00:00\n\
                    P003,2023-01-02T00:00:00,rem,2023-01-02T02:00:00,2023-01-02T02:15:00,15,extra\n";

        let records = transform(body);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("participantID"), Some(&json!("P001")));
        assert_eq!(records[1].get("participantID"), Some(&json!("P003")));
        assert_eq!(records[1].get("value"), Some(&json!("15")));
    }

    #[test]
    fn test_fractional_seconds_accepted() {
        let records = transform(
            "P001,2023-01-01T00:00:00.000,light,2023-01-01T23:10:00.000,2023-01-01T23:40:00.500,30\n",
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("startDate"), Some(&json!("2023-01-01T23:10:00Z")));
        assert_eq!(records[0].get("endDate"), Some(&json!("2023-01-01T23:40:00.500Z")));
    }

    #[test]
    fn test_header_only_recognized_on_first_line() {
        let row = StringRecord::from(vec!["participantID", "logDate", "type", "startDate", "endDate", "value"]);
        assert!(is_header(1, &row));
        assert!(!is_header(2, &row));

        let data = StringRecord::from(vec!["P001", "yesterday", "light", "a", "b", "30"]);
        assert!(!is_header(1, &data));
        assert_eq!(SleepRecord::from_row(&data).unwrap_err(), "yesterday");
    }

    #[test]
    fn test_bad_date_time_row_dropped_others_kept() {
        let body = "P001,01/01/2023,light,2023-01-01T23:10:00,2023-01-01T23:40:00,30\n\
                    P002,2023-01-01T00:00:00,deep,2023-01-01T01:00:00,2023-01-01T01:20:00,20\n";

        let records = transform(body);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("participantID"), Some(&json!("P002")));
    }

    #[test]
    fn test_empty_entry_yields_no_records() {
        assert!(transform("").is_empty());
    }

    #[test]
    fn test_recognize_by_tag() {
        let parser = SleepParser::default();
        assert!(parser.recognize("fitbit_sleep_logs/part-00000"));
        assert!(!parser.recognize("fitbit_intraday_activities_heart/P001/x.json"));
    }
}
