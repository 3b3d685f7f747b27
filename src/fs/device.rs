use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::{fsutil, mountinfo};

use super::{DeviceInfo, Error, FsInfo, Result};

/// Resolves directories to mount sources using a mountinfo file.
#[derive(Debug, Clone)]
pub struct MountInfoFsInfo {
    mountinfo_path: PathBuf,
}

impl MountInfoFsInfo {
    pub fn new(mountinfo_path: impl Into<PathBuf>) -> Self {
        Self {
            mountinfo_path: mountinfo_path.into(),
        }
    }
}

impl FsInfo for MountInfoFsInfo {
    fn dir_fs_device(&self, dir: &Path) -> Result<DeviceInfo> {
        let meta = std::fs::metadata(dir).map_err(|source| Error::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let (major, minor) = fsutil::split_device(meta.dev());

        let entries = mountinfo::read_mount_entries(&self.mountinfo_path)?;
        let entry =
            mountinfo::find_by_device(&entries, major, minor).ok_or_else(|| Error::DeviceNotFound {
                path: dir.to_path_buf(),
                major,
                minor,
            })?;

        Ok(DeviceInfo {
            device: entry.source.clone(),
            major,
            minor,
        })
    }
}
