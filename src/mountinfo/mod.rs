//! Access to `/proc/<pid>/mountinfo`.
//!
//! Used to locate the cgroup hierarchies, to build the machine's filesystem
//! inventory and to map a directory's device back to the mount source.

use std::path::PathBuf;

mod detect;
mod error;
mod parser;

pub use detect::{cgroup_mount_points, find_by_device, read_mount_entries};
pub use error::{Error, Result};
pub use parser::ParseError;

/// Cgroup subsystems the collector knows how to locate.
pub const SUPPORTED_SUBSYSTEMS: &[&str] = &[
    "cpu", "cpuacct", "cpuset", "memory", "blkio", "io", "pids", "hugetlb",
];

/// An owned, decoded mountinfo entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub major: u64,
    pub minor: u64,
    pub root: PathBuf,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub source: String,
    pub super_options: String,
}
