use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::mountinfo;

use super::{Error, Result};

/// Mount roots of the cgroup hierarchies, keyed by subsystem name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupSubsystems {
    mount_points: HashMap<String, PathBuf>,
}

impl CgroupSubsystems {
    pub fn new(mount_points: HashMap<String, PathBuf>) -> Self {
        Self { mount_points }
    }

    /// Discovers the cgroup mounts listed in a mountinfo file.
    ///
    /// Mount points are re-rooted under `rootfs`, so the hierarchies of the host stay
    /// reachable when the collector runs in a container with the host mounted there.
    ///
    /// # Errors
    ///
    /// - [`Error::Mountinfo`] if the file cannot be read.
    /// - [`Error::MissingSubsystems`] if no supported cgroup hierarchy is mounted.
    pub fn from_mountinfo(path: impl AsRef<Path>, rootfs: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let rootfs = rootfs.as_ref();
        let entries = mountinfo::read_mount_entries(path)?;
        let mount_points: HashMap<_, _> = mountinfo::cgroup_mount_points(&entries)
            .into_iter()
            .map(|(subsystem, mount_point)| (subsystem, join_absolute(rootfs, &mount_point)))
            .collect();
        if mount_points.is_empty() {
            return Err(Error::MissingSubsystems {
                path: path.to_path_buf(),
            });
        }

        for (subsystem, mount_point) in &mount_points {
            log::debug!("cgroup subsystem `{subsystem}` mounted at `{}`", mount_point.display());
        }
        Ok(Self { mount_points })
    }

    pub fn is_empty(&self) -> bool {
        self.mount_points.is_empty()
    }

    pub fn mount_point(&self, subsystem: &str) -> Option<&Path> {
        self.mount_points.get(subsystem).map(PathBuf::as_path)
    }

    pub fn mount_points(&self) -> &HashMap<String, PathBuf> {
        &self.mount_points
    }

    /// Absolute path of cgroup `name` in every mounted hierarchy.
    pub fn cgroup_paths(&self, name: &str) -> HashMap<String, PathBuf> {
        self.mount_points
            .iter()
            .map(|(subsystem, mount_point)| {
                (subsystem.clone(), join_absolute(mount_point, Path::new(name)))
            })
            .collect()
    }
}

/// Joins an absolute `path` below `root`. `/` maps to `root` itself.
pub(crate) fn join_absolute(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) if relative.as_os_str().is_empty() => root.to_path_buf(),
        Ok(relative) => root.join(relative),
        Err(_) => root.join(path),
    }
}
