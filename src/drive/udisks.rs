//! Linux removable-media support via `/dev/disk/by-id` and `udisksctl`.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::debug;

use super::{DriveError, RemovableMedia, Volume};

const BY_ID_DIR: &str = "/dev/disk/by-id";
const PROC_MOUNTS: &str = "/proc/mounts";

#[derive(Debug, Clone)]
pub struct UdisksMedia {
    by_id_dir: PathBuf,
    mounts_file: PathBuf,
}

impl Default for UdisksMedia {
    fn default() -> Self {
        Self {
            by_id_dir: PathBuf::from(BY_ID_DIR),
            mounts_file: PathBuf::from(PROC_MOUNTS),
        }
    }
}

impl RemovableMedia for UdisksMedia {
    fn detect(&mut self) -> Option<Volume> {
        let entries = fs::read_dir(&self.by_id_dir).ok()?;
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| is_usb_partition(name))
            .collect();
        names.sort();

        let name = names.into_iter().next()?;
        let device = fs::canonicalize(self.by_id_dir.join(&name)).ok()?;
        let mount_point = fs::read_to_string(&self.mounts_file)
            .ok()
            .and_then(|mounts| mount_point_for(&mounts, &device));
        debug!(device = %device.display(), mounted = mount_point.is_some(), "removable volume detected");

        Some(Volume {
            device,
            mount_point,
        })
    }

    fn mount(&mut self, volume: &Volume) -> Result<PathBuf, DriveError> {
        let stdout = udisksctl("mount", &volume.device).map_err(|reason| DriveError::Mount {
            device: volume.device.clone(),
            reason,
        })?;
        parse_mount_output(&stdout).ok_or_else(|| DriveError::Mount {
            device: volume.device.clone(),
            reason: format!("unrecognised udisksctl output: {}", stdout.trim()),
        })
    }

    fn unmount(&mut self, volume: &Volume) -> Result<(), DriveError> {
        udisksctl("unmount", &volume.device)
            .map(|_| ())
            .map_err(|reason| DriveError::Unmount {
                device: volume.device.clone(),
                reason,
            })
    }
}

fn udisksctl(verb: &str, device: &Path) -> Result<String, String> {
    let output = Command::new("udisksctl")
        .arg(verb)
        .arg("-b")
        .arg(device)
        .arg("--no-user-interaction")
        .output()
        .map_err(|err| err.to_string())?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

fn is_usb_partition(name: &str) -> bool {
    name.starts_with("usb-") && name.contains("-part")
}

/// Extracts the mount point from `Mounted /dev/sdb1 at /media/u/STICK.`
fn parse_mount_output(stdout: &str) -> Option<PathBuf> {
    let line = stdout.lines().find(|l| l.starts_with("Mounted "))?;
    let (_, rest) = line.split_once(" at ")?;
    let rest = rest.trim().trim_end_matches('.');
    (!rest.is_empty()).then(|| PathBuf::from(rest))
}

/// Looks `device` up in `/proc/mounts` text. Spaces in mount points are
/// octal-escaped there.
fn mount_point_for(mounts: &str, device: &Path) -> Option<PathBuf> {
    let device = device.to_str()?;
    mounts.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let dev = parts.next()?;
        let dir = parts.next()?;
        (dev == device).then(|| PathBuf::from(dir.replace("\\040", " ")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_usb_partitions_only() {
        assert!(is_usb_partition("usb-SanDisk_Cruzer_4C53-0:0-part1"));
        assert!(!is_usb_partition("usb-SanDisk_Cruzer_4C53-0:0"));
        assert!(!is_usb_partition("ata-Samsung_SSD-part1"));
    }

    #[test]
    fn parses_udisksctl_mount_line() {
        let out = "Mounted /dev/sdb1 at /media/scout/STICK.\n";
        assert_eq!(parse_mount_output(out), Some(PathBuf::from("/media/scout/STICK")));
        assert_eq!(parse_mount_output("Error mounting"), None);
    }

    #[test]
    fn finds_existing_mount_point() {
        let mounts = "/dev/sda2 / ext4 rw 0 0\n/dev/sdb1 /media/scout/MY\\040STICK vfat rw 0 0\n";
        assert_eq!(
            mount_point_for(mounts, Path::new("/dev/sdb1")),
            Some(PathBuf::from("/media/scout/MY STICK"))
        );
        assert_eq!(mount_point_for(mounts, Path::new("/dev/sdc1")), None);
    }
}
