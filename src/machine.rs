//! Host inventory needed to attribute filesystem and disk statistics.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil;
use crate::mountinfo;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Mountinfo(#[from] mountinfo::Error),
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// One mounted filesystem of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsInventoryEntry {
    /// Mount source, e.g. `/dev/sda1` or a ZFS dataset.
    pub device: String,
    pub fs_type: String,
    /// Size in bytes.
    pub capacity: u64,
    pub major: u64,
    pub minor: u64,
    pub mount_point: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineInfo {
    pub filesystems: Vec<FsInventoryEntry>,
    /// Block device names keyed by `(major, minor)`.
    pub disk_map: HashMap<(u64, u64), String>,
}

impl MachineInfo {
    pub fn device_name(&self, major: u64, minor: u64) -> Option<&str> {
        self.disk_map.get(&(major, minor)).map(String::as_str)
    }

    pub fn filesystem(&self, device: &str) -> Option<&FsInventoryEntry> {
        self.filesystems.iter().find(|fs| fs.device == device)
    }
}

pub trait MachineInfoProvider: Send + Sync {
    fn machine_info(&self) -> Result<MachineInfo>;
}

/// Builds the inventory from the host's mountinfo and `/proc/diskstats`.
#[derive(Debug, Clone)]
pub struct MountInfoMachine {
    rootfs: PathBuf,
}

impl MountInfoMachine {
    /// `rootfs` is where the host's root filesystem is visible (`/` on the host).
    pub fn new(rootfs: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
        }
    }

    fn filesystems(&self) -> Result<Vec<FsInventoryEntry>> {
        let entries = mountinfo::read_mount_entries(self.rootfs.join("proc/1/mountinfo"))?;
        let mut filesystems: Vec<FsInventoryEntry> = Vec::new();

        for entry in entries {
            if !(entry.source.starts_with("/dev/") || entry.fs_type == "zfs") {
                continue;
            }
            if filesystems.iter().any(|fs| fs.device == entry.source) {
                continue;
            }

            let mount_point = crate::cgroup::join_absolute(&self.rootfs, &entry.mount_point);
            let capacity = match fsutil::fs_capacity(&mount_point) {
                Ok(capacity) => capacity,
                Err(err) => {
                    log::debug!(
                        "skipping filesystem `{}` at `{}`: {}",
                        entry.source,
                        mount_point.display(),
                        err
                    );
                    continue;
                }
            };
            filesystems.push(FsInventoryEntry {
                device: entry.source,
                fs_type: entry.fs_type,
                capacity,
                major: entry.major,
                minor: entry.minor,
                mount_point: entry.mount_point,
            });
        }

        Ok(filesystems)
    }

    fn disk_map(&self) -> Result<HashMap<(u64, u64), String>> {
        let path = self.rootfs.join("proc/diskstats");
        parse_diskstats(fsutil::open_file_reader(&path)?, &path)
    }
}

impl MachineInfoProvider for MountInfoMachine {
    fn machine_info(&self) -> Result<MachineInfo> {
        Ok(MachineInfo {
            filesystems: self.filesystems()?,
            disk_map: self.disk_map()?,
        })
    }
}

/// Reads `major minor name ...` lines. Malformed lines are skipped.
fn parse_diskstats<R: BufRead>(reader: R, origin: &Path) -> Result<HashMap<(u64, u64), String>> {
    let mut disks = HashMap::new();
    for line in reader.lines() {
        let line = line.map_err(|source| Error::Read {
            path: origin.to_path_buf(),
            source,
        })?;
        let mut fields = line.split_whitespace();
        let (Some(major), Some(minor), Some(name)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let (Ok(major), Ok(minor)) = (major.parse(), minor.parse()) else {
            log::trace!("ignoring malformed diskstats line: {line}");
            continue;
        };
        disks.insert((major, minor), format!("/dev/{name}"));
    }
    Ok(disks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_diskstats() {
        let input = "\
   8       0 sda 100 0 200 0 0 0 0 0 0 0 0
   8       1 sda1 90 0 180 0 0 0 0 0 0 0 0
 253       0 dm-0 1 0 2 0 0 0 0 0 0 0 0
garbage
";
        let disks = parse_diskstats(Cursor::new(input), Path::new("/dummy")).unwrap();
        assert_eq!(disks.len(), 3);
        assert_eq!(disks[&(8, 1)], "/dev/sda1");
        assert_eq!(disks[&(253, 0)], "/dev/dm-0");
    }

    #[test]
    fn test_machine_info_lookups() {
        let info = MachineInfo {
            filesystems: vec![FsInventoryEntry {
                device: "/dev/sda1".to_owned(),
                fs_type: "ext4".to_owned(),
                capacity: 1 << 30,
                major: 8,
                minor: 1,
                mount_point: PathBuf::from("/"),
            }],
            disk_map: HashMap::from([((8, 0), "/dev/sda".to_owned())]),
        };
        assert_eq!(info.device_name(8, 0), Some("/dev/sda"));
        assert_eq!(info.device_name(8, 9), None);
        assert_eq!(info.filesystem("/dev/sda1").unwrap().capacity, 1 << 30);
        assert!(info.filesystem("/dev/sdb").is_none());
    }

    #[test]
    fn test_mountinfo_machine_reads_rootfs() {
        let rootfs = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(rootfs.path().join("proc/1")).unwrap();
        std::fs::write(
            rootfs.path().join("proc/1/mountinfo"),
            "70 56 8:1 / / rw,relatime - ext4 /dev/sda1 rw\n\
             25 1 0:24 / /proc rw,relatime - proc proc rw\n",
        )
        .unwrap();
        std::fs::write(rootfs.path().join("proc/diskstats"), "8 1 sda1 0 0 0\n").unwrap();

        let info = MountInfoMachine::new(rootfs.path()).machine_info().unwrap();
        assert_eq!(info.filesystems.len(), 1);
        assert_eq!(info.filesystems[0].device, "/dev/sda1");
        assert!(info.filesystems[0].capacity > 0);
        assert_eq!(info.device_name(8, 1), Some("/dev/sda1"));
    }
}
