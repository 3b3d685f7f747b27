//! Cgroup hierarchy access.
//!
//! [`CgroupSubsystems`] locates the mounted hierarchies, [`CgroupCollector`]
//! extracts a container's spec, stats and processes from its cgroup
//! directories. Parsing the CPU, memory and network counters is left to
//! collector implementations; [`BasicCgroupCollector`] only reports membership.
//!
//! # Platform Requirements
//!
//! - Linux with cgroup v1 or v2.
//! - Read access to the cgroup mounts (under `/rootfs` when containerized).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;

mod collector;
mod error;
mod subsystems;

pub use collector::{BasicCgroupCollector, CgroupCollector};
pub use error::{Error, Result};
pub use subsystems::CgroupSubsystems;
pub(crate) use subsystems::join_absolute;

/// Whether every one of the container's cgroup directories still exists.
pub fn cgroup_exists(paths: &HashMap<String, PathBuf>) -> bool {
    paths.values().all(|path| path.exists())
}

/// Lists the cgroups below `name`, as absolute cgroup names.
///
/// With `recursive` the whole subtree is returned, otherwise only direct children.
/// Hierarchies shared by several subsystems are scanned once. A cgroup that
/// disappears while scanning is skipped.
///
/// # Errors
///
/// Returns [`Error::Read`] if a directory exists but cannot be listed.
pub fn list_child_cgroups(
    paths: &HashMap<String, PathBuf>,
    name: &str,
    recursive: bool,
) -> Result<BTreeSet<String>> {
    let mut children = BTreeSet::new();
    let roots: HashSet<&PathBuf> = paths.values().collect();

    for root in roots {
        let mut stack = VecDeque::new();
        stack.push_back((root.clone(), name.trim_end_matches('/').to_owned()));
        while let Some((dir, cgroup)) = stack.pop_back() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(Error::Read { path: dir, source }),
            };
            for entry in entries {
                let entry = entry.map_err(|source| Error::Read {
                    path: dir.clone(),
                    source,
                })?;
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if !file_type.is_dir() {
                    continue;
                }

                let child = format!("{}/{}", cgroup, entry.file_name().to_string_lossy());
                if recursive {
                    stack.push_back((entry.path(), child.clone()));
                }
                children.insert(child);
            }
        }
    }

    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("system.slice/a.service")).unwrap();
        std::fs::create_dir_all(dir.path().join("docker/abc")).unwrap();
        std::fs::write(dir.path().join("cgroup.procs"), "1\n").unwrap();
        dir
    }

    #[test]
    fn test_list_direct_children() {
        let dir = hierarchy();
        let paths = HashMap::from([
            ("cpu".to_owned(), dir.path().to_path_buf()),
            ("memory".to_owned(), dir.path().to_path_buf()),
        ]);

        let children = list_child_cgroups(&paths, "/", false).unwrap();
        assert_eq!(
            children.into_iter().collect::<Vec<_>>(),
            vec!["/docker".to_owned(), "/system.slice".to_owned()]
        );
    }

    #[test]
    fn test_list_recursive_children() {
        let dir = hierarchy();
        let paths = HashMap::from([("cpu".to_owned(), dir.path().to_path_buf())]);

        let children = list_child_cgroups(&paths, "/", true).unwrap();
        assert!(children.contains("/docker/abc"));
        assert!(children.contains("/system.slice/a.service"));
        assert_eq!(children.len(), 4);
    }

    #[test]
    fn test_list_vanished_cgroup() {
        let paths = HashMap::from([("cpu".to_owned(), PathBuf::from("/definitely/not/here"))]);
        assert!(list_child_cgroups(&paths, "/gone", true).unwrap().is_empty());
    }

    #[test]
    fn test_cgroup_exists() {
        let dir = hierarchy();
        let mut paths = HashMap::from([("cpu".to_owned(), dir.path().join("docker/abc"))]);
        assert!(cgroup_exists(&paths));

        paths.insert("memory".to_owned(), dir.path().join("docker/gone"));
        assert!(!cgroup_exists(&paths));
        assert!(cgroup_exists(&HashMap::new()));
    }
}
