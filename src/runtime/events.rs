//! Runtime event stream payloads.

use std::path::PathBuf;

/// Events emitted from the single-consumer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A drain pass merged or dropped at least one item.
    Merged {
        /// Items merged into the store.
        merged: usize,
        /// Malformed items dropped.
        dropped: usize,
    },
    /// Snapshot and export were rewritten.
    Persisted {
        /// Observation groups in the store.
        groups: usize,
        /// Fields rendered as the missing marker.
        missing_fields: usize,
    },
    /// The export was copied to removable storage.
    DriveSynced {
        /// Destination file.
        target: PathBuf,
    },
    /// A drive copy failed; the dirty flag is still set.
    DriveSyncFailed,
    /// Final drain completed; the loop has stopped.
    ShutdownComplete,
}
