pub mod csv;
pub mod json;

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::core::store::StoreError;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot {path} does not exist")]
    SnapshotMissing { path: PathBuf },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snapshot {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot {path} is inconsistent: {source}")]
    Inconsistent {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Writes `bytes` to a sibling temp file, syncs it, then renames it over `path`
/// so readers only ever see a complete file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
