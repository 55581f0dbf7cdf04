//! MDH Ingest - MyDataHelps export ingestion tool

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdh_common::logging::{init_logging, LogConfig, LogLevel};
use mdh_ingest::archive::{classify_file_name, FileNameClass};
use mdh_ingest::{
    DeviceRegistry, DocumentLedger, DocumentStore, ExportRouter, IngestConfig, MemoryStore,
    PgDocumentStore, RunSummary,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mdh-ingest")]
#[command(author, version, about = "Ingest MyDataHelps wearable exports")]
struct Cli {
    /// Config file (JSON or TOML)
    #[arg(short, long, env = "MDH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the export directory once
    Run {
        /// Overrides `export_dir` from the configuration
        #[arg(short, long)]
        export_dir: Option<PathBuf>,

        /// Use an in-memory store and ledger; nothing is persisted.
        /// The database ledger is not consulted, so every entry is treated
        /// as new
        #[arg(long)]
        dry_run: bool,
    },

    /// Show whether file names would be picked up as export archives
    CheckName {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("mdh-ingest")
        .build()
        .apply_env()?;

    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            export_dir,
            dry_run,
        } => {
            let mut config = IngestConfig::load(cli.config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(dir) = export_dir {
                config.export_dir = dir;
            }

            let summary = if dry_run {
                info!("Dry run: empty in-memory ledger, every entry counts as pending");
                ingest(&config, &MemoryStore::new()).await?
            } else {
                let store = PgDocumentStore::connect(&config.database)
                    .await
                    .context("Failed to connect to database")?;
                if config.database.run_migrations {
                    store.migrate().await?;
                }
                ingest(&config, &store).await?
            };

            info!(
                run_id = %summary.run_id,
                processed = summary.pairings_processed,
                records = summary.records_written,
                "Ingestion complete"
            );
            if summary.pairings_failed > 0 || summary.ledger_failures > 0 {
                warn!(
                    failed = summary.pairings_failed,
                    ledger_failures = summary.ledger_failures,
                    "Some entries will be retried on the next run"
                );
            }
        },
        Command::CheckName { names } => {
            for name in names {
                match classify_file_name(&name) {
                    FileNameClass::Candidate { lowered } => println!("accept  {name} ({lowered})"),
                    FileNameClass::Rejected(reason) => println!("reject  {name} ({reason:?})"),
                }
            }
        },
    }

    Ok(())
}

async fn ingest(config: &IngestConfig, store: &dyn DocumentStore) -> Result<RunSummary> {
    let registry = DeviceRegistry::from_config(&config.devices)?;
    let ledger = DocumentLedger::new(store, &config.ledger.collection);

    let result = ExportRouter::new(&config.ledger)
        .run(&config.export_dir, &registry, &ledger, store)
        .await;

    store.disconnect().await?;
    Ok(result?)
}
