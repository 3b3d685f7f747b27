//! Instantaneous task counts of a cgroup via the kernel's taskstats interface.
//!
//! The counts are queried over a generic netlink socket with
//! `CGROUPSTATS_CMD_GET`. They cover only the tasks directly in the cgroup,
//! not those of its descendants.
//!
//! # Platform Requirements
//!
//! - Linux with `CONFIG_TASKSTATS`.
//! - `CAP_NET_ADMIN` is not required, but the cgroup directory must be readable.

use std::path::{Path, PathBuf};

use crate::info::LoadStats;

mod conn;
mod message;
mod reader;

pub use reader::NetlinkReader;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cgroup path of container `{0}` is empty")]
    EmptyPath(String),
    #[error("netlink socket operation `{op}` failed: {source}")]
    Socket {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open cgroup directory `{path}`: {source}")]
    OpenCgroup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("generic netlink family `{0}` not found")]
    FamilyNotFound(String),
    #[error("kernel replied with error: {0}")]
    Kernel(#[source] std::io::Error),
    #[error("malformed netlink message: {0}")]
    Malformed(&'static str),
    #[error("unexpected netlink message type {0}")]
    UnexpectedMessage(u16),
    #[error("netlink connection is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Source of per-cgroup task counts.
pub trait LoadReader: Send + Sync {
    /// Task counts of the cgroup at `path`. `name` identifies the container in errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPath`] if `path` is empty.
    fn cpu_load(&self, name: &str, path: &Path) -> Result<LoadStats>;
}
