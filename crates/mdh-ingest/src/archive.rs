//! Export archive discovery and reading
//!
//! MyDataHelps exports land in a directory as one zip per participant and
//! date range:
//!
//! ```text
//! RK.<participant id>.<project>_<YYYYMMDD>-<YYYYMMDD>.zip
//! ```
//!
//! Anything that does not match that shape is skipped quietly, because the
//! export directory is expected to collect unrelated files over time.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::error::{IngestError, Result};

/// Number of `.`-separated tokens in a valid export file name
pub const EXPORT_NAME_TOKENS: usize = 4;

/// Required extension token, compared after lower-casing
pub const EXPORT_EXTENSION: &str = "zip";

/// Why a directory entry name was not accepted as an export archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Name did not split into exactly four tokens
    TokenCount(usize),
    /// Four tokens, but the last one is not `zip`
    Extension,
}

/// Outcome of [`classify_file_name`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNameClass {
    /// Candidate archive; carries the lower-cased name
    Candidate { lowered: String },
    Rejected(RejectReason),
}

impl FileNameClass {
    pub fn is_candidate(&self) -> bool {
        matches!(self, FileNameClass::Candidate { .. })
    }
}

/// Classify a raw directory entry name by the export naming convention
///
/// Case-insensitive. Accepts iff the name has exactly four `.` tokens and
/// the last is `zip`. No other part of the name is validated.
pub fn classify_file_name(name: &str) -> FileNameClass {
    let lowered = name.to_lowercase();
    let tokens: Vec<&str> = lowered.split('.').collect();

    if tokens.len() != EXPORT_NAME_TOKENS {
        return FileNameClass::Rejected(RejectReason::TokenCount(tokens.len()));
    }
    if tokens[EXPORT_NAME_TOKENS - 1] != EXPORT_EXTENSION {
        return FileNameClass::Rejected(RejectReason::Extension);
    }

    FileNameClass::Candidate { lowered }
}

/// A directory entry that passed the naming check
///
/// Transient: built per run, never persisted.
#[derive(Debug, Clone)]
pub struct ExportArchive {
    source_path: PathBuf,
    file_name: String,
}

impl ExportArchive {
    /// Build from a path, returning `None` when the file name is rejected
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let source_path = path.into();
        let raw_name = source_path.file_name()?.to_string_lossy().into_owned();

        match classify_file_name(&raw_name) {
            FileNameClass::Candidate { lowered } => Some(Self {
                source_path,
                file_name: lowered,
            }),
            FileNameClass::Rejected(reason) => {
                debug!(component = "router", file = %raw_name, ?reason, "Not an export archive");
                None
            },
        }
    }

    /// Path as found on disk (original case)
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Lower-cased file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    fn token(&self, index: usize) -> &str {
        self.file_name.split('.').nth(index).unwrap_or_default()
    }

    /// Participant id embedded in the name (lower-cased, not validated)
    pub fn participant_token(&self) -> &str {
        self.token(1)
    }

    /// `<project>_<start>-<end>` part of the name (lower-cased, not validated)
    pub fn project_token(&self) -> &str {
        self.token(2)
    }

    /// Open the zip directory; the file handle lives as long as the result
    pub fn open(&self) -> Result<OpenArchive> {
        let display = self.source_path.display().to_string();
        let file = File::open(&self.source_path).map_err(|e| IngestError::Archive {
            path: display.clone(),
            source: zip::result::ZipError::Io(e),
        })?;
        let archive = ZipArchive::new(file).map_err(|source| IngestError::Archive {
            path: display.clone(),
            source,
        })?;

        Ok(OpenArchive {
            archive,
            path: display,
        })
    }
}

/// An opened export archive
///
/// Dropping it closes the underlying file.
pub struct OpenArchive {
    archive: ZipArchive<File>,
    path: String,
}

impl OpenArchive {
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// In-archive path of the entry at `index`, or `None` for directories
    pub fn entry_name(&mut self, index: usize) -> Result<Option<String>> {
        let file = self
            .archive
            .by_index_raw(index)
            .map_err(|source| IngestError::Archive {
                path: self.path.clone(),
                source,
            })?;

        if file.is_dir() {
            return Ok(None);
        }
        Ok(Some(file.name().to_string()))
    }

    /// Fully buffer the entry at `index`
    ///
    /// Fails when fewer bytes come out than the zip directory declares.
    pub fn read_entry(&mut self, index: usize) -> Result<ArchiveEntry> {
        let mut file = self
            .archive
            .by_index(index)
            .map_err(|source| IngestError::Archive {
                path: self.path.clone(),
                source,
            })?;

        let path = file.name().to_string();
        let declared_size = file.size();
        let mut data = Vec::with_capacity(usize::try_from(declared_size).unwrap_or(0));

        file.read_to_end(&mut data)
            .map_err(|source| IngestError::EntryRead {
                path: path.clone(),
                source,
            })?;

        let read = data.len() as u64;
        if read < declared_size {
            return Err(IngestError::ShortRead {
                path,
                declared: declared_size,
                read,
            });
        }

        debug!(component = "router", entry = %path, bytes = read, "Entry buffered");
        Ok(ArchiveEntry {
            path,
            data,
            declared_size,
        })
    }
}

/// One file inside an export archive, fully buffered
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    path: String,
    data: Vec<u8>,
    declared_size: u64,
}

impl ArchiveEntry {
    /// Build an entry from bytes already in memory
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let declared_size = data.len() as u64;
        Self {
            path: path.into(),
            data,
            declared_size,
        }
    }

    /// Full in-archive path; this is the ledger key
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    #[test]
    fn test_accepts_export_name_any_case() {
        assert!(classify_file_name("RK.P001.StudyA_20230101-20230131.ZIP").is_candidate());
        assert!(classify_file_name("rk.p001.studya_20230101-20230131.zip").is_candidate());
        assert_eq!(
            classify_file_name("RK.P001.StudyA_20230101-20230131.Zip"),
            FileNameClass::Candidate {
                lowered: "rk.p001.studya_20230101-20230131.zip".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_wrong_token_count() {
        assert_eq!(
            classify_file_name("RK.P001.zip"),
            FileNameClass::Rejected(RejectReason::TokenCount(3))
        );
        assert_eq!(
            classify_file_name("RK.P001.Study.A_1-2.zip"),
            FileNameClass::Rejected(RejectReason::TokenCount(5))
        );
        assert_eq!(classify_file_name(""), FileNameClass::Rejected(RejectReason::TokenCount(1)));
        assert_eq!(
            classify_file_name(".hidden"),
            FileNameClass::Rejected(RejectReason::TokenCount(2))
        );
    }

    #[test]
    fn test_rejects_wrong_extension() {
        assert_eq!(
            classify_file_name("RK.P001.StudyA_x.tar"),
            FileNameClass::Rejected(RejectReason::Extension)
        );
        assert_eq!(
            classify_file_name("RK.P001.StudyA_x.zipx"),
            FileNameClass::Rejected(RejectReason::Extension)
        );
    }

    #[test]
    fn test_export_archive_tokens() {
        let archive =
            ExportArchive::from_path("/exports/RK.P001.StudyA_20230101-20230131.zip").unwrap();
        assert_eq!(archive.participant_token(), "p001");
        assert_eq!(archive.project_token(), "studya_20230101-20230131");
        assert!(ExportArchive::from_path("/exports/notes.txt").is_none());
    }

    #[test]
    fn test_open_and_read_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RK.P001.StudyA_20230101-20230131.zip");

        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .add_directory("fitbit_sleep_logs/", SimpleFileOptions::default())
            .unwrap();
        writer
            .start_file("fitbit_sleep_logs/part-0", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"P001,a,b,c,d,e\n").unwrap();
        writer.finish().unwrap();

        let archive = ExportArchive::from_path(&path).unwrap();
        let mut opened = archive.open().unwrap();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened.entry_name(0).unwrap(), None);
        assert_eq!(
            opened.entry_name(1).unwrap().as_deref(),
            Some("fitbit_sleep_logs/part-0")
        );

        let entry = opened.read_entry(1).unwrap();
        assert_eq!(entry.path(), "fitbit_sleep_logs/part-0");
        assert_eq!(entry.data(), b"P001,a,b,c,d,e\n");
        assert_eq!(entry.declared_size(), 15);
    }

    #[test]
    fn test_open_corrupt_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RK.P002.StudyA_20230101-20230131.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let archive = ExportArchive::from_path(&path).unwrap();
        assert!(matches!(archive.open(), Err(IngestError::Archive { .. })));
    }
}
