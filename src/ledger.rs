//! The service object that owns all mutable scouting state.
//!
//! One [`Ledger`] exists per process. Producers only ever see an
//! [`IngestSender`]; everything else happens on the single consumer that calls
//! [`Ledger::update`].

use std::collections::BTreeMap;

use tracing::{error, info};

use crate::{
    audit::{self, AuditReport, Schedule},
    config::{DataPaths, FieldSchema},
    core::store::RecordStore,
    drive::{DriveSyncManager, SyncOutcome},
    persist::{PersistResult, csv::{CsvExporter, ExportSummary}, json::SnapshotFile},
    queue::{DrainOutcome, IngestQueue, IngestSender, ingest_channel},
    types::{Revision, TimestampKey},
};

/// What one update cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub drained: DrainOutcome,
    /// Set when the snapshot and export were rewritten this cycle.
    pub persisted: Option<ExportSummary>,
    pub sync: SyncOutcome,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    pub groups: usize,
    pub records: usize,
    pub queued: usize,
    pub drive_dirty: bool,
    pub persist_pending: bool,
}

pub struct Ledger {
    store: RecordStore,
    queue: IngestQueue,
    sender: IngestSender,
    snapshot: SnapshotFile,
    exporter: CsvExporter,
    drive: DriveSyncManager,
    persist_pending: bool,
}

impl Ledger {
    pub fn new(
        store: RecordStore,
        snapshot: SnapshotFile,
        exporter: CsvExporter,
        drive: DriveSyncManager,
    ) -> Self {
        let (sender, queue) = ingest_channel();
        Self {
            store,
            queue,
            sender,
            snapshot,
            exporter,
            drive,
            persist_pending: false,
        }
    }

    /// Loads the last snapshot from `paths`. Fails rather than starting empty.
    pub fn open(paths: &DataPaths, schema: &FieldSchema, drive: DriveSyncManager) -> PersistResult<Self> {
        let snapshot = SnapshotFile::new(paths.snapshot());
        let store = snapshot.load()?;
        info!(
            path = %snapshot.path().display(),
            groups = store.group_count(),
            records = store.record_count(),
            "snapshot loaded"
        );
        let exporter = CsvExporter::new(paths.export(), schema.export_columns());
        Ok(Self::new(store, snapshot, exporter, drive))
    }

    /// A producer handle onto this ledger's queue.
    pub fn sender(&self) -> IngestSender {
        self.sender.clone()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn drive(&self) -> &DriveSyncManager {
        &self.drive
    }

    pub fn exporter(&self) -> &CsvExporter {
        &self.exporter
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            groups: self.store.group_count(),
            records: self.store.record_count(),
            queued: self.queue.len(),
            drive_dirty: self.drive.is_dirty(),
            persist_pending: self.persist_pending,
        }
    }

    /// Merges everything currently queued.
    pub fn drain_and_merge(&mut self) -> DrainOutcome {
        let outcome = self.queue.drain_into(&mut self.store);
        if outcome.changed() {
            self.persist_pending = true;
        }
        outcome
    }

    /// Rewrites the snapshot and then the export. The drive becomes dirty once
    /// the export lands.
    pub fn persist(&mut self) -> PersistResult<ExportSummary> {
        self.snapshot.write(&self.store)?;
        let summary = self.exporter.write(&self.store)?;
        self.persist_pending = false;
        self.drive.mark_dirty();
        info!(
            groups = self.store.group_count(),
            rows = summary.rows,
            missing_fields = summary.missing.len(),
            "dataset persisted"
        );
        Ok(summary)
    }

    /// One consumer cycle: drain, persist if anything changed (or a previous
    /// write failed), then attempt a drive sync.
    pub fn update(&mut self) -> CycleReport {
        let drained = self.drain_and_merge();

        let persisted = if self.persist_pending {
            match self.persist() {
                Ok(summary) => Some(summary),
                Err(err) => {
                    error!(error = %err, "persisting dataset failed, will retry");
                    None
                }
            }
        } else {
            None
        };

        let sync = self.drive.sync(self.exporter.path());

        CycleReport {
            drained,
            persisted,
            sync,
        }
    }

    /// Forces the next cycle to copy the export to the drive.
    pub fn request_drive_sync(&mut self) {
        self.drive.mark_dirty();
    }

    pub fn audit(&self, schedule: Option<&Schedule>) -> AuditReport {
        audit::audit(self.store.authoritative().map(|row| row.record), schedule)
    }

    pub fn sync_summary(&self, source: &str) -> BTreeMap<TimestampKey, Revision> {
        self.store.sync_summary(source)
    }
}
