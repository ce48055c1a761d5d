use std::{collections::BTreeMap, sync::Arc};

use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    task::JoinError,
    time::{Duration, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{
    audit::{AuditReport, Schedule},
    config::LedgerConfig,
    drive::SyncOutcome,
    ledger::{CycleReport, Ledger, LedgerStats},
    queue::IngestSender,
    record::RawRecord,
    types::{Revision, Source, TimestampKey},
};

use super::events::LedgerEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("ledger runtime has stopped")]
    ChannelClosed,
    #[error("ledger cycle panicked: {0}")]
    Join(#[from] JoinError),
}

/// Cloneable front door to the running ledger. Ingestion never waits on the
/// consumer; queries and control go through the command channel.
#[derive(Clone)]
pub struct LedgerHandle {
    ingest: IngestSender,
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<LedgerEvent>,
}

enum Command {
    Audit {
        schedule: Option<Schedule>,
        resp: oneshot::Sender<AuditReport>,
    },
    SyncSummary {
        source: Source,
        resp: oneshot::Sender<BTreeMap<TimestampKey, Revision>>,
    },
    Stats {
        resp: oneshot::Sender<LedgerStats>,
    },
    RequestDriveSync {
        resp: oneshot::Sender<()>,
    },
    Flush {
        resp: oneshot::Sender<Result<CycleReport, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<CycleReport, RuntimeError>>,
    },
}

/// Moves `ledger` onto its own consumer task and returns the handle.
pub fn spawn_ledger(ledger: Ledger, config: LedgerConfig) -> LedgerHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<LedgerEvent>(config.event_capacity.max(1));
    let ingest = ledger.sender();

    let events_tx_loop = events_tx.clone();
    let ledger = Arc::new(Mutex::new(ledger));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all ledger handles dropped");
                        let _ = run_cycle(&ledger, &events_tx_loop).await;
                        let _ = events_tx_loop.send(LedgerEvent::ShutdownComplete);
                        break;
                    };
                    if handle_command(cmd, &ledger, &events_tx_loop).await {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let _ = run_cycle(&ledger, &events_tx_loop).await;
                }
            }
        }
    });

    LedgerHandle {
        ingest,
        cmd_tx,
        events_tx,
    }
}

impl LedgerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events_tx.subscribe()
    }

    /// Producer handle for a device connection.
    pub fn sender(&self) -> IngestSender {
        self.ingest.clone()
    }

    /// Queues one record; returns immediately.
    pub fn enqueue(&self, raw: RawRecord, source: impl Into<Source>) {
        self.ingest.enqueue(raw, source);
    }

    pub async fn audit(&self, schedule: Option<Schedule>) -> Result<AuditReport, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Audit { schedule, resp: tx }).await?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn sync_summary(
        &self,
        source: impl Into<Source>,
    ) -> Result<BTreeMap<TimestampKey, Revision>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SyncSummary {
            source: source.into(),
            resp: tx,
        })
        .await?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn stats(&self) -> Result<LedgerStats, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats { resp: tx }).await?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Marks the drive dirty so the next cycle copies the export again.
    pub async fn request_drive_sync(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::RequestDriveSync { resp: tx }).await?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Runs a cycle now instead of waiting for the next tick.
    pub async fn flush(&self) -> Result<CycleReport, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush { resp: tx }).await?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Drains and persists one last time, then stops the loop.
    pub async fn shutdown(&self) -> Result<CycleReport, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown { resp: tx }).await?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    async fn send(&self, cmd: Command) -> Result<(), RuntimeError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn handle_command(
    cmd: Command,
    ledger: &Arc<Mutex<Ledger>>,
    events_tx: &broadcast::Sender<LedgerEvent>,
) -> bool {
    match cmd {
        Command::Audit { schedule, resp } => {
            let report = ledger.lock().await.audit(schedule.as_ref());
            let _ = resp.send(report);
        }
        Command::SyncSummary { source, resp } => {
            let summary = ledger.lock().await.sync_summary(source.as_str());
            let _ = resp.send(summary);
        }
        Command::Stats { resp } => {
            let _ = resp.send(ledger.lock().await.stats());
        }
        Command::RequestDriveSync { resp } => {
            ledger.lock().await.request_drive_sync();
            let _ = resp.send(());
        }
        Command::Flush { resp } => {
            let _ = resp.send(run_cycle(ledger, events_tx).await);
        }
        Command::Shutdown { resp } => {
            let out = run_cycle(ledger, events_tx).await;
            info!("ledger stopped after final drain");
            let _ = events_tx.send(LedgerEvent::ShutdownComplete);
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

/// Runs [`Ledger::update`] off the async workers; the cycle may block on disk
/// or removable media.
async fn run_cycle(
    ledger: &Arc<Mutex<Ledger>>,
    events_tx: &broadcast::Sender<LedgerEvent>,
) -> Result<CycleReport, RuntimeError> {
    let ledger_ref = Arc::clone(ledger);
    let report = tokio::task::spawn_blocking(move || {
        let mut ledger = ledger_ref.blocking_lock();
        ledger.update()
    })
    .await?;

    publish(&report, events_tx);
    Ok(report)
}

fn publish(report: &CycleReport, events_tx: &broadcast::Sender<LedgerEvent>) {
    if report.drained.merged > 0 || report.drained.dropped > 0 {
        let _ = events_tx.send(LedgerEvent::Merged {
            merged: report.drained.merged,
            dropped: report.drained.dropped,
        });
    }
    if let Some(summary) = &report.persisted {
        let _ = events_tx.send(LedgerEvent::Persisted {
            groups: summary.rows,
            missing_fields: summary.missing.len(),
        });
    }
    match &report.sync {
        SyncOutcome::Copied(target) => {
            let _ = events_tx.send(LedgerEvent::DriveSynced {
                target: target.clone(),
            });
        }
        SyncOutcome::Failed => {
            let _ = events_tx.send(LedgerEvent::DriveSyncFailed);
        }
        _ => {}
    }
}
