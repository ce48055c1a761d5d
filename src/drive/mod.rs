//! Mirrors the CSV export onto removable storage.
//!
//! The manager only talks to a [`RemovableMedia`] capability; platform
//! specifics live behind it.

#[cfg(target_os = "linux")]
pub mod udisks;

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::persist::tmp_path;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("drive target {path} is not reachable")]
    TargetUnreachable { path: PathBuf },
    #[error("export {path} has no file name")]
    NoFileName { path: PathBuf },
    #[error("copy to {path} failed: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("mount of {device} failed: {reason}")]
    Mount { device: PathBuf, reason: String },
    #[error("unmount of {device} failed: {reason}")]
    Unmount { device: PathBuf, reason: String },
}

/// A removable block device reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub device: PathBuf,
    /// Set when the OS already has it mounted.
    pub mount_point: Option<PathBuf>,
}

/// Platform hooks for finding and attaching removable volumes.
pub trait RemovableMedia: Send {
    fn detect(&mut self) -> Option<Volume>;
    fn mount(&mut self, volume: &Volume) -> Result<PathBuf, DriveError>;
    fn unmount(&mut self, volume: &Volume) -> Result<(), DriveError>;
}

/// Used where no platform integration exists; never finds a volume.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMedia;

impl RemovableMedia for NoMedia {
    fn detect(&mut self) -> Option<Volume> {
        None
    }

    fn mount(&mut self, volume: &Volume) -> Result<PathBuf, DriveError> {
        Err(DriveError::Mount {
            device: volume.device.clone(),
            reason: "removable media unsupported on this platform".to_string(),
        })
    }

    fn unmount(&mut self, _volume: &Volume) -> Result<(), DriveError> {
        Ok(())
    }
}

/// The platform's removable-media integration.
#[cfg(target_os = "linux")]
pub fn platform_media() -> Box<dyn RemovableMedia> {
    Box::new(udisks::UdisksMedia::default())
}

/// The platform's removable-media integration.
#[cfg(not(target_os = "linux"))]
pub fn platform_media() -> Box<dyn RemovableMedia> {
    Box::new(NoMedia)
}

/// Result of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing new since the last successful copy.
    Clean,
    /// Export copied; dirty flag cleared.
    Copied(PathBuf),
    /// No configured target and no volume detected.
    NoTarget,
    /// No export has been written yet.
    NoExport,
    /// Inside the back-off window after a failure.
    Deferred,
    /// Copy, mount or unmount failed; will retry next cycle.
    Failed,
}

pub struct DriveSyncManager {
    target: Option<PathBuf>,
    media: Box<dyn RemovableMedia>,
    dirty: bool,
    retry_backoff: Duration,
    last_failure: Option<Instant>,
}

impl DriveSyncManager {
    /// Starts dirty so the first cycle mirrors whatever export exists.
    pub fn new(target: Option<PathBuf>, media: Box<dyn RemovableMedia>) -> Self {
        Self {
            target,
            media,
            dirty: true,
            retry_backoff: Duration::ZERO,
            last_failure: None,
        }
    }

    /// Minimum wait after a failed attempt before trying again.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the export as changed, forcing a copy on the next cycle.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Runs one sync attempt for `export`. Blocks for the duration of any
    /// mount/copy/unmount.
    pub fn sync(&mut self, export: &Path) -> SyncOutcome {
        if !self.dirty {
            return SyncOutcome::Clean;
        }
        if self
            .last_failure
            .is_some_and(|at| at.elapsed() < self.retry_backoff)
        {
            return SyncOutcome::Deferred;
        }
        if !export.is_file() {
            return SyncOutcome::NoExport;
        }

        let result = match self.target.clone() {
            Some(dir) => self.copy_to_target(export, &dir).map(Some),
            None => self.copy_to_detected(export),
        };

        match result {
            Ok(Some(dest)) => {
                self.dirty = false;
                self.last_failure = None;
                info!(dest = %dest.display(), "export mirrored to drive");
                SyncOutcome::Copied(dest)
            }
            Ok(None) => {
                debug!("no removable drive present");
                SyncOutcome::NoTarget
            }
            Err(err) => {
                warn!(error = %err, "drive sync failed, will retry");
                self.last_failure = Some(Instant::now());
                SyncOutcome::Failed
            }
        }
    }

    fn copy_to_target(&self, export: &Path, dir: &Path) -> Result<PathBuf, DriveError> {
        if !dir.is_dir() {
            return Err(DriveError::TargetUnreachable {
                path: dir.to_path_buf(),
            });
        }
        copy_atomic(export, dir)
    }

    fn copy_to_detected(&mut self, export: &Path) -> Result<Option<PathBuf>, DriveError> {
        let Some(volume) = self.media.detect() else {
            return Ok(None);
        };

        let (mount_point, mounted_here) = match &volume.mount_point {
            Some(existing) => (existing.clone(), false),
            None => (self.media.mount(&volume)?, true),
        };

        let copied = copy_atomic(export, &mount_point);

        if mounted_here {
            if let Err(err) = self.media.unmount(&volume) {
                // A failed unmount keeps the cycle dirty even when the copy landed.
                return Err(copied.err().unwrap_or(err));
            }
        }

        copied.map(Some)
    }
}

/// Copies `src` into `dir` under its own file name via a synced temp file.
pub fn copy_atomic(src: &Path, dir: &Path) -> Result<PathBuf, DriveError> {
    let name = src.file_name().ok_or_else(|| DriveError::NoFileName {
        path: src.to_path_buf(),
    })?;
    let dest = dir.join(name);
    let tmp = tmp_path(&dest);

    let copy = || -> io::Result<()> {
        fs::copy(src, &tmp)?;
        fs::OpenOptions::new().write(true).open(&tmp)?.sync_all()?;
        fs::rename(&tmp, &dest)
    };

    copy().map_err(|source| {
        let _ = fs::remove_file(&tmp);
        DriveError::Copy {
            path: dest.clone(),
            source,
        }
    })?;

    Ok(dest)
}
