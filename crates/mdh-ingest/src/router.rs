//! Export directory scan
//!
//! One pass over the export directory: every candidate archive is opened,
//! every entry is offered to the registered parsers, and each (entry,
//! parser) pairing that the ledger does not know yet is transformed,
//! written and then recorded.
//!
//! Failures are contained to the smallest unit they affect. Only a missing
//! or unreadable export directory ends a run early.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::archive::{ArchiveEntry, ExportArchive, OpenArchive};
use crate::config::{LedgerConfig, DEFAULT_LEDGER_RECORD_ATTEMPTS, DEFAULT_LEDGER_RETRY_DELAY_MS};
use crate::devices::{DeviceParser, DeviceRegistry, NormalizedRecord};
use crate::error::{IngestError, Result};
use crate::ledger::{record_with_retry, ProcessedLedger};
use crate::store::DocumentStore;

/// Counters for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Directory entries that were not export archives
    pub files_ignored: usize,
    pub archives_seen: usize,
    pub archives_opened: usize,
    pub archives_skipped: usize,
    /// Pairings transformed and written in this run
    pub pairings_processed: usize,
    /// Pairings the ledger already had
    pub pairings_skipped: usize,
    pub pairings_failed: usize,
    pub records_written: usize,
    /// Pairings whose data was written but whose ledger entry was not
    pub ledger_failures: usize,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            files_ignored: 0,
            archives_seen: 0,
            archives_opened: 0,
            archives_skipped: 0,
            pairings_processed: 0,
            pairings_skipped: 0,
            pairings_failed: 0,
            records_written: 0,
            ledger_failures: 0,
        }
    }
}

/// Drives a scan of one export directory
#[derive(Debug, Clone)]
pub struct ExportRouter {
    record_attempts: u32,
    retry_delay: Duration,
}

impl Default for ExportRouter {
    fn default() -> Self {
        Self {
            record_attempts: DEFAULT_LEDGER_RECORD_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_LEDGER_RETRY_DELAY_MS),
        }
    }
}

impl ExportRouter {
    pub fn new(ledger: &LedgerConfig) -> Self {
        Self {
            record_attempts: ledger.record_attempts,
            retry_delay: Duration::from_millis(ledger.retry_delay_ms),
        }
    }

    /// Override the ledger write retry policy
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.record_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Scan `export_dir` once
    ///
    /// Returns an error only when the directory itself cannot be used. The
    /// summary says what happened to everything inside it.
    pub async fn run(
        &self,
        export_dir: &Path,
        registry: &DeviceRegistry,
        ledger: &dyn ProcessedLedger,
        store: &dyn DocumentStore,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("ingest_run", %run_id);

        self.scan(run_id, export_dir, registry, ledger, store)
            .instrument(span)
            .await
    }

    async fn scan(
        &self,
        run_id: Uuid,
        export_dir: &Path,
        registry: &DeviceRegistry,
        ledger: &dyn ProcessedLedger,
        store: &dyn DocumentStore,
    ) -> Result<RunSummary> {
        if export_dir.as_os_str().is_empty() {
            return Err(IngestError::config("Export directory path is empty"));
        }

        let started = Instant::now();
        info!(
            component = "router",
            export_dir = %export_dir.display(),
            parsers = ?registry.names(),
            "Starting export scan"
        );

        let mut summary = RunSummary::new(run_id);

        for path in list_files(export_dir, &mut summary).await? {
            let Some(archive) = ExportArchive::from_path(&path) else {
                summary.files_ignored += 1;
                continue;
            };
            summary.archives_seen += 1;

            self.process_archive(&archive, registry, ledger, store, &mut summary)
                .await;
        }

        info!(
            component = "router",
            archives = summary.archives_seen,
            archives_skipped = summary.archives_skipped,
            processed = summary.pairings_processed,
            already_done = summary.pairings_skipped,
            failed = summary.pairings_failed,
            records = summary.records_written,
            ledger_failures = summary.ledger_failures,
            duration_ms = started.elapsed().as_millis() as u64,
            "Export scan finished"
        );

        Ok(summary)
    }

    async fn process_archive(
        &self,
        archive: &ExportArchive,
        registry: &DeviceRegistry,
        ledger: &dyn ProcessedLedger,
        store: &dyn DocumentStore,
        summary: &mut RunSummary,
    ) {
        let mut opened = match archive.open() {
            Ok(opened) => opened,
            Err(e) => {
                warn!(component = "router", archive = %archive.file_name(), error = %e, "Skipping archive");
                summary.archives_skipped += 1;
                return;
            },
        };
        summary.archives_opened += 1;
        debug!(
            component = "router",
            archive = %archive.file_name(),
            participant = %archive.participant_token(),
            entries = opened.len(),
            "Archive opened"
        );

        for index in 0..opened.len() {
            let entry_path = match opened.entry_name(index) {
                Ok(Some(name)) => name,
                Ok(None) => continue,
                Err(e) => {
                    warn!(component = "router", archive = %archive.file_name(), index, error = %e, "Unreadable zip entry header");
                    continue;
                },
            };

            self.process_entry(&mut opened, index, &entry_path, registry, ledger, store, summary)
                .await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_entry(
        &self,
        opened: &mut OpenArchive,
        index: usize,
        entry_path: &str,
        registry: &DeviceRegistry,
        ledger: &dyn ProcessedLedger,
        store: &dyn DocumentStore,
        summary: &mut RunSummary,
    ) {
        let mut pending: Vec<&dyn DeviceParser> = Vec::new();

        for parser in registry.matching(entry_path) {
            match ledger.lookup(entry_path, parser.name()).await {
                Ok(Some(done)) => {
                    debug!(
                        component = "router",
                        entry = %entry_path,
                        parser = %parser.name(),
                        recorded_at = ?done.date,
                        "Already processed"
                    );
                    summary.pairings_skipped += 1;
                },
                Ok(None) => pending.push(parser),
                Err(e) => {
                    warn!(
                        component = "ledger",
                        entry = %entry_path,
                        parser = %parser.name(),
                        error = %e,
                        "Ledger lookup failed, processing anyway"
                    );
                    pending.push(parser);
                },
            }
        }

        if pending.is_empty() {
            return;
        }

        let entry = match opened.read_entry(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    component = "router",
                    archive = %opened.path(),
                    entry = %entry_path,
                    pending = pending.len(),
                    error = %e,
                    "Cannot read entry"
                );
                summary.pairings_failed += pending.len();
                return;
            },
        };

        for parser in pending {
            self.process_pairing(&entry, parser, ledger, store, summary)
                .await;
        }
    }

    async fn process_pairing(
        &self,
        entry: &ArchiveEntry,
        parser: &dyn DeviceParser,
        ledger: &dyn ProcessedLedger,
        store: &dyn DocumentStore,
        summary: &mut RunSummary,
    ) {
        let records = match parser.transform(entry) {
            Ok(records) => records,
            Err(e) => {
                warn!(component = "router", entry = %entry.path(), parser = %parser.name(), error = %e, "Transform failed");
                summary.pairings_failed += 1;
                return;
            },
        };

        if !records.is_empty() {
            let documents: Vec<Value> = records
                .into_iter()
                .map(NormalizedRecord::into_document)
                .collect();

            match store.insert_batch(parser.collection(), documents).await {
                Ok(outcome) => {
                    if outcome.is_partial() {
                        warn!(
                            component = "router",
                            entry = %entry.path(),
                            collection = %parser.collection(),
                            submitted = outcome.submitted,
                            accepted = outcome.accepted,
                            "Store kept fewer records than submitted"
                        );
                    }
                    summary.records_written += outcome.accepted;
                },
                Err(e) => {
                    warn!(
                        component = "router",
                        entry = %entry.path(),
                        collection = %parser.collection(),
                        error = %e,
                        "Write failed"
                    );
                    summary.pairings_failed += 1;
                    return;
                },
            }
        } else {
            debug!(component = "router", entry = %entry.path(), parser = %parser.name(), "No records produced");
        }

        summary.pairings_processed += 1;

        if let Err(e) = record_with_retry(
            ledger,
            entry.path(),
            parser.name(),
            self.record_attempts,
            self.retry_delay,
        )
        .await
        {
            error!(
                component = "ledger",
                entry = %entry.path(),
                parser = %parser.name(),
                attempts = self.record_attempts,
                error = %e,
                "Could not record processed entry; it will be ingested again next run"
            );
            summary.ledger_failures += 1;
        }
    }
}

/// Regular files in `dir`, sorted by name
async fn list_files(dir: &Path, summary: &mut RunSummary) -> Result<Vec<PathBuf>> {
    let directory_error = |source: std::io::Error| IngestError::Directory {
        path: dir.display().to_string(),
        source,
    };

    let mut listing = tokio::fs::read_dir(dir).await.map_err(directory_error)?;
    let mut files = Vec::new();

    while let Some(entry) = listing.next_entry().await.map_err(directory_error)? {
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => files.push(entry.path()),
            Ok(_) => {
                debug!(component = "router", path = %entry.path().display(), "Not a regular file");
                summary.files_ignored += 1;
            },
            Err(e) => {
                debug!(component = "router", path = %entry.path().display(), error = %e, "Cannot stat directory entry");
                summary.files_ignored += 1;
            },
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
