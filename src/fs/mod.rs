//! Filesystem usage of container writable layers.
//!
//! - [`FsUsageSampler`] periodically walks a container's root filesystem and log
//!   directory in the background and serves the last snapshot.
//! - [`DriverUsageCorrector`] overlays the exact figures of storage drivers that
//!   allocate from a pool (devicemapper thin pools, ZFS datasets).
//! - [`MountInfoFsInfo`] resolves a directory to its backing device.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BoxError;

mod corrector;
mod device;
mod sampler;
mod walk;

pub use corrector::DriverUsageCorrector;
pub use device::MountInfoFsInfo;
pub use sampler::FsUsageSampler;
pub use walk::{DirUsage, dir_usage};

/// Default interval between two usage samples.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to walk `{path}`: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no mount found for device {major}:{minor} of `{path}`")]
    DeviceNotFound { path: PathBuf, major: u64, minor: u64 },
    #[error(transparent)]
    Mountinfo(#[from] crate::mountinfo::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Disk usage snapshot of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsUsage {
    /// Bytes in the writable layer (or allocated from the pool).
    pub base_usage_bytes: u64,
    /// Base usage plus logs and other attributed directories.
    pub total_usage_bytes: u64,
    pub inode_usage: u64,
}

/// Source of a container's filesystem usage.
pub trait FsHandler: Send + Sync {
    /// Starts background sampling. Calling it on a running handler is a no-op.
    fn start(&self);
    /// Stops background sampling. Safe to call more than once.
    fn stop(&self);
    /// Returns the last snapshot without blocking.
    fn usage(&self) -> FsUsage;
}

/// Reports bytes allocated to a device or dataset (thin-pool device id, ZFS filesystem).
pub trait UsageWatcher: Send + Sync {
    fn usage(&self, id: &str) -> std::result::Result<u64, BoxError>;
}

/// Device backing a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Mount source, e.g. `/dev/sda1`.
    pub device: String,
    pub major: u64,
    pub minor: u64,
}

pub trait FsInfo: Send + Sync {
    fn dir_fs_device(&self, dir: &Path) -> Result<DeviceInfo>;
}
