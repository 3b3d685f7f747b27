use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::{env, fs};

use super::{Error, Result};
use crate::fsutil;

/// Cgroup path fragments written by the common container runtimes.
const RUNTIME_MARKERS: [&str; 4] = ["docker", "kubepods", "containerd", "libpod"];

/// Returns true if `rootfs` contains a mounted `/proc`.
///
/// # Errors
///
/// Returns [`Error::ExistenceCheck`] if the existence of `proc` cannot be determined.
pub fn contains_proc_mount(rootfs: &Path) -> Result<bool> {
    let path = rootfs.join("proc");
    path.try_exists()
        .map_err(|source| Error::ExistenceCheck { path, source })
}

/// Returns true if the host's init process lives in a different `kind` namespace
/// (`pid`, `net`, `mnt`, ...) than this process.
///
/// # Errors
///
/// Returns [`Error::ReadNamespace`] if either namespace link cannot be read.
pub fn namespace_differs(rootfs: &Path, kind: &str) -> Result<bool> {
    let read = |path: PathBuf| {
        fs::read_link(&path).map_err(|source| Error::ReadNamespace { path, source })
    };
    let own = read(PathBuf::from("/proc/self/ns").join(kind))?;
    let host = read(rootfs.join("proc/1/ns").join(kind))?;
    Ok(own != host)
}

/// Returns true if the cgroup membership file at `path` (usually `/proc/self/cgroup`)
/// names a container runtime or a container id.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file cannot be opened.
/// - [`Error::ReadLine`] if a line cannot be read.
pub fn cgroup_indicates_container(path: &Path) -> Result<bool> {
    let reader = fsutil::open_file_reader(path)?;
    for line in reader.lines() {
        let line = line.map_err(|source| Error::ReadLine {
            path: path.to_path_buf(),
            source,
        })?;
        // <hierarchy-id>:<controller-list>:<cgroup-path>
        let cgroup = line.splitn(3, ':').nth(2).unwrap_or_default();
        if RUNTIME_MARKERS.iter().any(|marker| cgroup.contains(marker)) {
            return Ok(true);
        }
        if cgroup
            .split(['/', '-', '.'])
            .any(|part| part.len() >= 32 && is_hex(part))
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Returns true if marker files or variables left by container engines are present.
pub fn has_container_markers() -> bool {
    Path::new("/.dockerenv").exists()
        || Path::new("/run/.containerenv").exists()
        || env::var_os("container").is_some()
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}
