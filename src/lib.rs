//! Latest-revision-wins ledger for scouting observations, with JSON
//! snapshotting, CSV export, removable-drive mirroring and a completeness
//! audit.
//!
//! # Examples
//!
//! Merging directly into a [`core::store::RecordStore`]:
//! ```
//! use scoutlog::{core::store::RecordStore, types::Source};
//! use serde_json::json;
//!
//! let mut store = RecordStore::new();
//! for (rev, team) in [(1, "118"), (2, "119")] {
//!     let raw = json!({"timestamp": "1000", "revision": rev, "team": team, "match": "3"});
//!     store.merge(raw.as_object().cloned().expect("object"), Source::new("R1")).expect("merge");
//! }
//! let rows: Vec<_> = store.authoritative().collect();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].record.team().as_deref(), Some("119"));
//! ```
//!
//! Running the consumer loop:
//! ```no_run
//! use scoutlog::{
//!     config::{DataPaths, FieldSchema, LedgerConfig},
//!     drive::{DriveSyncManager, platform_media},
//!     ledger::Ledger,
//!     runtime::handle::spawn_ledger,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let paths = DataPaths::new("/srv/scouting");
//! let schema = FieldSchema::load(&paths.fields()).expect("fields");
//! let drive = DriveSyncManager::new(None, platform_media());
//! let ledger = Ledger::open(&paths, &schema, drive).expect("load snapshot");
//! let handle = spawn_ledger(ledger, LedgerConfig::default());
//! let raw = json!({"timestamp": 1000, "revision": 1, "team": "118", "match": "3"});
//! handle.enqueue(raw.as_object().cloned().expect("object"), "R1 Demeter");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Completeness audit against the match schedule.
pub mod audit;
/// Runtime tuning and on-disk settings.
pub mod config;
/// Core in-memory store.
pub mod core;
/// Removable-drive mirroring of the export.
pub mod drive;
/// Service object owning the store, queue, persistence and drive sync.
pub mod ledger;
/// JSON snapshot and CSV export.
pub mod persist;
/// Multi-producer ingestion queue.
pub mod queue;
/// Observation records and value rendering.
pub mod record;
/// Single-consumer runtime handle and events.
pub mod runtime;
/// Shared keys and common field names.
pub mod types;
