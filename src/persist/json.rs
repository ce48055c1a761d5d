//! Durable JSON snapshot of every revision held by the store.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::core::store::{RecordStore, StoreSnapshot};

use super::{PersistError, PersistResult, atomic_write};

/// The `data.json` document.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Rehydrates the store. A missing or unreadable snapshot is an error,
    /// never an empty store.
    pub fn load(&self) -> PersistResult<RecordStore> {
        let bytes = fs::read(&self.path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                PersistError::SnapshotMissing {
                    path: self.path.clone(),
                }
            } else {
                PersistError::io(&self.path, err)
            }
        })?;

        let snapshot: StoreSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| PersistError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        RecordStore::from_snapshot(snapshot).map_err(|source| PersistError::Inconsistent {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the snapshot with the full contents of `store`.
    pub fn write(&self, store: &RecordStore) -> PersistResult<()> {
        let bytes = serde_json::to_vec(&store.export_snapshot())?;
        atomic_write(&self.path, &bytes).map_err(|err| PersistError::io(&self.path, err))
    }

    /// Writes an empty snapshot unless one already exists. Returns whether a
    /// file was created.
    pub fn init_empty(&self) -> PersistResult<bool> {
        if self.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| PersistError::io(parent, err))?;
        }
        self.write(&RecordStore::new())?;
        Ok(true)
    }
}
