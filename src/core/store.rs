use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::{
    record::{RawRecord, Record, parse_revision_key},
    types::{REVISION, Revision, Source, TIMESTAMP, TimestampKey},
};

/// An enqueued item that cannot be merged. The item is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("record from {device} has no usable {field} field")]
    MissingKey { device: Source, field: &'static str },
    #[error("record from {device} has non-numeric revision {value}")]
    InvalidRevision { device: Source, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("snapshot group {device}/{timestamp} has non-numeric revision key {key:?}")]
    InvalidRevisionKey {
        device: Source,
        timestamp: TimestampKey,
        key: String,
    },
}

/// On-disk shape: source, then timestamp, then revision, all string keys.
pub type StoreSnapshot = BTreeMap<Source, BTreeMap<TimestampKey, BTreeMap<String, Record>>>;

/// Where a merged record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeKey {
    pub source: Source,
    pub timestamp: TimestampKey,
    pub revision: Revision,
    pub replaced: bool,
}

/// Every revision submitted for one (source, timestamp) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationGroup {
    revisions: BTreeMap<Revision, Record>,
}

impl ObservationGroup {
    /// The record at the highest revision.
    pub fn authoritative(&self) -> Option<(Revision, &Record)> {
        self.revisions.last_key_value().map(|(rev, rec)| (*rev, rec))
    }

    pub fn revisions(&self) -> &BTreeMap<Revision, Record> {
        &self.revisions
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

/// One row of the merged dataset.
#[derive(Debug, Clone, Copy)]
pub struct Authoritative<'a> {
    pub source: &'a Source,
    pub timestamp: &'a str,
    pub revision: Revision,
    pub record: &'a Record,
}

#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    groups: BTreeMap<Source, BTreeMap<TimestampKey, ObservationGroup>>,
    record_count: usize,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let mut store = Self::new();

        for (source, by_ts) in snapshot {
            for (timestamp, by_rev) in by_ts {
                for (key, record) in by_rev {
                    let revision =
                        parse_revision_key(&key).ok_or_else(|| StoreError::InvalidRevisionKey {
                            device: source.clone(),
                            timestamp: timestamp.clone(),
                            key: key.clone(),
                        })?;
                    store.insert(source.clone(), timestamp.clone(), revision, record);
                }
            }
        }

        Ok(store)
    }

    pub fn export_snapshot(&self) -> StoreSnapshot {
        self.groups
            .iter()
            .map(|(source, by_ts)| {
                let by_ts = by_ts
                    .iter()
                    .map(|(ts, group)| {
                        let by_rev = group
                            .revisions
                            .iter()
                            .map(|(rev, rec)| (rev.to_string(), rec.clone()))
                            .collect();
                        (ts.clone(), by_rev)
                    })
                    .collect();
                (source.clone(), by_ts)
            })
            .collect()
    }

    /// Validates the identifying fields of `raw` and stores it under
    /// (source, timestamp, revision), overwriting any earlier copy of that
    /// revision.
    pub fn merge(&mut self, raw: RawRecord, source: Source) -> Result<MergeKey, MergeError> {
        let record = Record::new(raw);

        let timestamp = record.timestamp_key().ok_or_else(|| MergeError::MissingKey {
            device: source.clone(),
            field: TIMESTAMP,
        })?;

        let revision = match record.get(REVISION) {
            None => {
                return Err(MergeError::MissingKey {
                    device: source,
                    field: REVISION,
                });
            }
            Some(value) => record.revision().ok_or_else(|| MergeError::InvalidRevision {
                device: source.clone(),
                value: value.to_string(),
            })?,
        };

        let replaced = self
            .insert(source.clone(), timestamp.clone(), revision, record)
            .is_some();
        debug!(%source, %timestamp, revision, replaced, "merged record");

        Ok(MergeKey {
            source,
            timestamp,
            revision,
            replaced,
        })
    }

    /// Inserts at an explicit key, returning the record previously held there.
    pub fn insert(
        &mut self,
        source: Source,
        timestamp: TimestampKey,
        revision: Revision,
        record: Record,
    ) -> Option<Record> {
        let prev = self
            .groups
            .entry(source)
            .or_default()
            .entry(timestamp)
            .or_default()
            .revisions
            .insert(revision, record);
        if prev.is_none() {
            self.record_count += 1;
        }
        prev
    }

    pub fn group(&self, source: &str, timestamp: &str) -> Option<&ObservationGroup> {
        self.groups.get(source).and_then(|by_ts| by_ts.get(timestamp))
    }

    /// The merged dataset: one entry per group, sources then timestamps ascending.
    pub fn authoritative(&self) -> impl Iterator<Item = Authoritative<'_>> + '_ {
        self.groups.iter().flat_map(|(source, by_ts)| {
            by_ts.iter().filter_map(move |(timestamp, group)| {
                group.authoritative().map(|(revision, record)| Authoritative {
                    source,
                    timestamp,
                    revision,
                    record,
                })
            })
        })
    }

    /// Highest revision held per timestamp for one device.
    pub fn sync_summary(&self, source: &str) -> BTreeMap<TimestampKey, Revision> {
        self.groups
            .get(source)
            .into_iter()
            .flat_map(|by_ts| by_ts.iter())
            .filter_map(|(ts, group)| group.authoritative().map(|(rev, _)| (ts.clone(), rev)))
            .collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }
}
