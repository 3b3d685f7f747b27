use std::path::{Path, PathBuf};

use super::checks::{
    cgroup_indicates_container, contains_proc_mount, has_container_markers, namespace_differs,
};
use super::{Error, Result};

/// Where the collector process runs relative to the host it monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    /// Directly on the host.
    Host,
    /// Inside a container, with the host's root filesystem mounted somewhere.
    Container,
}

impl RuntimeEnvironment {
    /// Whether host paths can be used as-is. Handlers re-root storage paths under
    /// the host root mount otherwise.
    pub fn in_host_namespace(&self) -> bool {
        matches!(self, RuntimeEnvironment::Host)
    }

    /// The directory under which the host's `/` is visible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHostRoot`] when running in a container without
    /// `rootfs` being mounted.
    pub fn host_root(&self, rootfs: &Path) -> Result<PathBuf> {
        match self {
            RuntimeEnvironment::Host => Ok(PathBuf::from("/")),
            RuntimeEnvironment::Container if rootfs.exists() => Ok(rootfs.to_path_buf()),
            RuntimeEnvironment::Container => Err(Error::MissingHostRoot(rootfs.to_path_buf())),
        }
    }
}

/// Detects whether this process runs in a container or on the host.
///
/// Checks, in order:
///
/// 1. whether `rootfs/proc` exists and init's pid namespace differs from ours,
/// 2. `/proc/self/cgroup` for runtime names or container ids,
/// 3. marker files and variables left by container engines.
///
/// Failing checks are logged as warnings and treated as inconclusive.
pub fn detect_runtime_environment(rootfs: &Path) -> RuntimeEnvironment {
    match contains_proc_mount(rootfs) {
        Ok(true) => match namespace_differs(rootfs, "pid") {
            Ok(true) => return RuntimeEnvironment::Container,
            Ok(false) => {}
            Err(err) => log::warn!("namespace check failed during environment detection: {err}"),
        },
        Ok(false) => {}
        Err(err) => log::warn!("failed to check for /proc under `{}`: {err}", rootfs.display()),
    }

    match cgroup_indicates_container(Path::new("/proc/self/cgroup")) {
        Ok(true) => return RuntimeEnvironment::Container,
        Ok(false) => {}
        Err(err) => log::warn!("cgroup check failed during environment detection: {err}"),
    }

    if has_container_markers() {
        return RuntimeEnvironment::Container;
    }

    RuntimeEnvironment::Host
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_root_on_host() {
        let env = RuntimeEnvironment::Host;
        assert!(env.in_host_namespace());
        assert_eq!(
            env.host_root(Path::new("/does/not/matter")).unwrap(),
            PathBuf::from("/")
        );
    }

    #[test]
    fn test_host_root_in_container() {
        let env = RuntimeEnvironment::Container;
        assert!(!env.in_host_namespace());

        let rootfs = tempfile::tempdir().unwrap();
        assert_eq!(env.host_root(rootfs.path()).unwrap(), rootfs.path());
        assert!(matches!(
            env.host_root(Path::new("/definitely/not/here")),
            Err(Error::MissingHostRoot(_))
        ));
    }
}
