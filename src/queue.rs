//! Multi-producer ingestion queue feeding the single merge consumer.

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::warn;

use crate::{
    core::store::RecordStore,
    record::RawRecord,
    types::Source,
};

/// One submission waiting to be merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    /// Untyped field map from the device.
    pub raw: RawRecord,
    /// Device that submitted it.
    pub source: Source,
}

/// Producer end. Cheap to clone, one per device connection.
#[derive(Debug, Clone)]
pub struct IngestSender {
    tx: mpsc::UnboundedSender<Pending>,
}

/// Consumer end, owned by the ledger.
#[derive(Debug)]
pub struct IngestQueue {
    rx: mpsc::UnboundedReceiver<Pending>,
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Items merged into the store.
    pub merged: usize,
    /// Items dropped as malformed.
    pub dropped: usize,
}

impl DrainOutcome {
    /// True when the store was touched and downstream persistence must run.
    pub fn changed(&self) -> bool {
        self.merged > 0
    }
}

/// Creates a connected sender/queue pair.
pub fn ingest_channel() -> (IngestSender, IngestQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IngestSender { tx }, IngestQueue { rx })
}

impl IngestSender {
    /// Queues a record without blocking. Never fails; if the consumer is gone
    /// the loss is logged.
    pub fn enqueue(&self, raw: RawRecord, source: impl Into<Source>) {
        let source = source.into();
        if let Err(err) = self.tx.send(Pending { raw, source }) {
            warn!(source = %err.0.source, "ingest queue closed, record discarded");
        }
    }

    /// True once the consumer end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl IngestQueue {
    /// Pops until the queue is empty, merging each item into `store`.
    pub fn drain_into(&mut self, store: &mut RecordStore) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();

        loop {
            let item = match self.rx.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };

            match store.merge(item.raw, item.source) {
                Ok(_) => outcome.merged += 1,
                Err(err) => {
                    warn!(error = %err, "dropping malformed record");
                    outcome.dropped += 1;
                }
            }
        }

        outcome
    }

    /// Number of items currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
