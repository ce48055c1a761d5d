//! scoutlog - scouting data server
//!
//! Entry point: loads configuration and the snapshot, then runs the ledger.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scoutlog::{
    audit::Schedule,
    config::{DataPaths, DeviceDirectory, FieldSchema, LOCAL_SETTINGS_FILE, LedgerConfig, LocalSettings},
    drive::{DriveSyncManager, platform_media},
    ledger::Ledger,
    persist::json::SnapshotFile,
    record::RawRecord,
    runtime::handle::spawn_ledger,
};

/// Scouting data server: merges device submissions, exports CSV, audits coverage
#[derive(Parser, Debug)]
#[command(name = "scoutlog", version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the ledger, reading JSON lines {"source": ..., "record": {...}} from stdin
    Serve {
        /// Directory holding data.json, data.csv, fields.txt and mac.json
        #[arg(long, value_name = "DIR")]
        data_dir: PathBuf,
        /// Removable drive directory (defaults to DRIVE in local_constants.json)
        #[arg(long, value_name = "DIR")]
        drive: Option<PathBuf>,
        /// Field list file (defaults to <data-dir>/fields.txt)
        #[arg(long, value_name = "FILE")]
        fields: Option<PathBuf>,
        /// Idle time between drain cycles
        #[arg(long, default_value = "100", value_name = "MS")]
        poll_ms: u64,
        /// Wait after a failed drive copy before retrying
        #[arg(long, default_value = "2000", value_name = "MS")]
        drive_retry_ms: u64,
    },
    /// Create an empty snapshot if none exists
    Init {
        #[arg(long, value_name = "DIR")]
        data_dir: PathBuf,
    },
    /// Report missing, extra and duplicate match data
    Audit {
        #[arg(long, value_name = "DIR")]
        data_dir: PathBuf,
        /// Schedule JSON: {"<match>": {"red": [...], "blue": [...]}}
        #[arg(long, value_name = "FILE")]
        schedule: Option<PathBuf>,
    },
    /// Rebuild data.csv from the snapshot
    Export {
        #[arg(long, value_name = "DIR")]
        data_dir: PathBuf,
        #[arg(long, value_name = "FILE")]
        fields: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct IntakeLine {
    source: String,
    record: RawRecord,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Serve {
            data_dir,
            drive,
            fields,
            poll_ms,
            drive_retry_ms,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create async runtime")?;
            let result = runtime.block_on(serve(data_dir, drive, fields, poll_ms, drive_retry_ms));
            // The stdin reader sits in an uncancellable blocking read; don't wait on it.
            runtime.shutdown_background();
            result
        }
        Cmd::Init { data_dir } => {
            let snapshot = SnapshotFile::new(DataPaths::new(data_dir).snapshot());
            if snapshot.init_empty()? {
                info!(path = %snapshot.path().display(), "created empty snapshot");
            } else {
                info!(path = %snapshot.path().display(), "snapshot already exists");
            }
            Ok(())
        }
        Cmd::Audit { data_dir, schedule } => {
            let paths = DataPaths::new(data_dir);
            let store = SnapshotFile::new(paths.snapshot())
                .load()
                .context("Failed to load snapshot")?;
            let schedule = schedule.as_deref().map(load_schedule).transpose()?;
            let report = scoutlog::audit::audit(
                store.authoritative().map(|row| row.record),
                schedule.as_ref(),
            );
            if report.is_clean() {
                info!("no gaps found");
            }
            Ok(())
        }
        Cmd::Export { data_dir, fields } => {
            let paths = DataPaths::new(data_dir);
            let schema = load_schema(&paths, fields.as_deref())?;
            let store = SnapshotFile::new(paths.snapshot())
                .load()
                .context("Failed to load snapshot")?;
            let exporter = scoutlog::persist::csv::CsvExporter::new(paths.export(), schema.export_columns());
            let summary = exporter.write(&store)?;
            info!(rows = summary.rows, path = %exporter.path().display(), "export written");
            Ok(())
        }
    }
}

async fn serve(
    data_dir: PathBuf,
    drive: Option<PathBuf>,
    fields: Option<PathBuf>,
    poll_ms: u64,
    drive_retry_ms: u64,
) -> Result<()> {
    let paths = DataPaths::new(data_dir);
    let schema = load_schema(&paths, fields.as_deref())?;

    let drive = match drive {
        Some(dir) => Some(dir),
        None => configured_drive()?,
    };
    if let Some(dir) = &drive {
        info!(drive = %dir.display(), "mirroring export to configured drive");
    }
    let drive = DriveSyncManager::new(drive, platform_media())
        .with_retry_backoff(Duration::from_millis(drive_retry_ms));

    let ledger = Ledger::open(&paths, &schema, drive).context("Failed to load snapshot")?;
    let config = LedgerConfig {
        poll_interval_ms: poll_ms,
        ..LedgerConfig::default()
    };
    let devices = load_devices(&paths)?;
    let handle = spawn_ledger(ledger, config);
    info!("waiting for submissions");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match serde_json::from_str::<IntakeLine>(&line) {
                        Ok(intake) => handle.enqueue(intake.record, devices.resolve(&intake.source)),
                        Err(err) => warn!(error = %err, "unreadable intake line"),
                    },
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    let report = handle.shutdown().await.context("Final drain failed")?;
    info!(merged = report.drained.merged, "server stopped");
    Ok(())
}

fn load_schema(paths: &DataPaths, fields: Option<&Path>) -> Result<FieldSchema> {
    let path = fields.map(Path::to_path_buf).unwrap_or_else(|| paths.fields());
    FieldSchema::load(&path).with_context(|| format!("Failed to load field names from {}", path.display()))
}

/// Device labels from `mac.json`; without the file, sources pass through as given.
fn load_devices(paths: &DataPaths) -> Result<DeviceDirectory> {
    let path = paths.device_map();
    if !path.exists() {
        return Ok(DeviceDirectory::default());
    }
    DeviceDirectory::load(&path).with_context(|| format!("Failed to load device labels from {}", path.display()))
}

fn configured_drive() -> Result<Option<PathBuf>> {
    let path = Path::new(LOCAL_SETTINGS_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let settings = LocalSettings::load(path)?;
    Ok(settings.drive_path())
}

fn load_schedule(path: &Path) -> Result<Schedule> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schedule {}", path.display()))?;
    let schedule = Schedule::from_json(&text)
        .with_context(|| format!("Failed to parse schedule {}", path.display()))?;
    if schedule.is_empty() {
        bail!("schedule {} has no qualification matches", path.display());
    }
    Ok(schedule)
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("scoutlog=debug,warn")
    } else {
        EnvFilter::new("scoutlog=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
