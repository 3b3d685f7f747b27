//! Docker runtime support.
//!
//! [`register`] asks the daemon for its storage layout and registers a
//! [`DockerFactory`] that builds a [`DockerContainerHandler`] for every cgroup
//! named after a Docker container id.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cgroup::CgroupSubsystems;
use crate::container::{Collaborators, FactoryRegistry, MetricSet, WatchSource};
use crate::fs::{self, UsageWatcher};

pub mod client;
mod factory;
mod handler;
pub mod layer;

pub use client::{DockerApi, DockerClient};
pub use factory::DockerFactory;
pub use handler::DockerContainerHandler;

/// Namespace reported in the references of Docker containers.
pub const DOCKER_NAMESPACE: &str = "docker";

const DEFAULT_STORAGE_DIR: &str = "/var/lib/docker";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] client::Error),
    #[error("failed to inspect container `{id}`: {source}")]
    Inspect {
        id: String,
        #[source]
        source: client::Error,
    },
    #[error("no cgroup subsystems available")]
    NoCgroups,
    #[error("failed to read layer mount id `{path}`: {source}")]
    ReadMountId {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid creation time `{value}` of container `{id}`: {source}")]
    InvalidCreated {
        id: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Storage driver of the Docker daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageDriver {
    Devicemapper,
    Aufs,
    Overlay,
    Overlay2,
    Zfs,
    Other(String),
}

impl StorageDriver {
    pub fn as_str(&self) -> &str {
        match self {
            StorageDriver::Devicemapper => "devicemapper",
            StorageDriver::Aufs => "aufs",
            StorageDriver::Overlay => "overlay",
            StorageDriver::Overlay2 => "overlay2",
            StorageDriver::Zfs => "zfs",
            StorageDriver::Other(name) => name,
        }
    }

    /// Whether container filesystem usage can be attributed for this driver.
    pub fn supports_fs_stats(&self) -> bool {
        !matches!(self, StorageDriver::Other(_))
    }
}

impl From<&str> for StorageDriver {
    fn from(name: &str) -> Self {
        match name {
            "devicemapper" => StorageDriver::Devicemapper,
            "aufs" => StorageDriver::Aufs,
            "overlay" => StorageDriver::Overlay,
            "overlay2" => StorageDriver::Overlay2,
            "zfs" => StorageDriver::Zfs,
            other => StorageDriver::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for StorageDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-provided settings of the Docker integration.
#[derive(Clone)]
pub struct DockerOptions {
    /// Overrides the daemon's reported root directory.
    pub root_dir: Option<PathBuf>,
    /// Where the host's root filesystem is mounted when not in the host namespace.
    pub rootfs_prefix: PathBuf,
    /// Environment variables copied into container specs.
    pub env_metadata_whitelist: Vec<String>,
    pub metrics: MetricSet,
    pub sampler_period: Duration,
    pub thin_pool_watcher: Option<Arc<dyn UsageWatcher>>,
    pub zfs_watcher: Option<Arc<dyn UsageWatcher>>,
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            root_dir: None,
            rootfs_prefix: PathBuf::from("/rootfs"),
            env_metadata_whitelist: Vec::new(),
            metrics: MetricSet::all(),
            sampler_period: fs::DEFAULT_PERIOD,
            thin_pool_watcher: None,
            zfs_watcher: None,
        }
    }
}

/// Daemon-wide state shared by the factory and all its handlers.
#[derive(Clone)]
pub struct DockerSettings {
    pub subsystems: CgroupSubsystems,
    pub driver: StorageDriver,
    /// The daemon's root directory as seen from the host.
    pub storage_dir: PathBuf,
    pub version: [u64; 3],
    /// Thin-pool name reported by the devicemapper driver.
    pub thin_pool_name: String,
    /// Parent dataset reported by the zfs driver.
    pub zfs_parent: String,
    pub options: DockerOptions,
}

/// Connects to the daemon and registers the Docker factory.
///
/// Nothing is registered unless every step succeeds.
///
/// # Errors
///
/// - [`Error::Client`] if the daemon cannot be queried or reports an unparsable version.
/// - [`Error::NoCgroups`] if no cgroup hierarchy is mounted.
pub async fn register(
    registry: &FactoryRegistry,
    client: Arc<dyn DockerApi>,
    collaborators: Collaborators,
    subsystems: CgroupSubsystems,
    options: DockerOptions,
) -> Result<()> {
    let info = client.info().await?;
    let version = client.version().await?;
    let version_parts = client::parse_version(&version.version)?;
    if subsystems.is_empty() {
        return Err(Error::NoCgroups);
    }

    let driver = StorageDriver::from(info.driver.as_str());
    let storage_dir = options.root_dir.clone().unwrap_or_else(|| {
        if info.docker_root_dir.is_empty() {
            PathBuf::from(DEFAULT_STORAGE_DIR)
        } else {
            PathBuf::from(&info.docker_root_dir)
        }
    });
    let settings = DockerSettings {
        subsystems,
        thin_pool_name: info.driver_status("Pool Name").unwrap_or_default().to_owned(),
        zfs_parent: info
            .driver_status("Parent Dataset")
            .unwrap_or_default()
            .to_owned(),
        driver,
        storage_dir,
        version: version_parts,
        options,
    };

    log::info!(
        "registering docker factory: version {}, storage driver `{}`, root `{}`",
        version.version,
        settings.driver,
        settings.storage_dir.display()
    );
    let factory = DockerFactory::new(client, collaborators, settings);
    registry.register(Arc::new(factory), &[WatchSource::Raw, WatchSource::Docker]);

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeDocker, collaborators};
    use super::*;
    use crate::container::MetricKind;
    use std::collections::HashMap;

    fn subsystems() -> CgroupSubsystems {
        CgroupSubsystems::new(HashMap::from([(
            "cpu".to_owned(),
            PathBuf::from("/sys/fs/cgroup/cpu"),
        )]))
    }

    #[test]
    fn test_storage_driver_names() {
        assert_eq!(StorageDriver::from("overlay2"), StorageDriver::Overlay2);
        assert_eq!(
            StorageDriver::from("btrfs"),
            StorageDriver::Other("btrfs".to_owned())
        );
        assert_eq!(StorageDriver::Other("vfs".to_owned()).to_string(), "vfs");
        assert!(StorageDriver::Zfs.supports_fs_stats());
        assert!(!StorageDriver::Other("vfs".to_owned()).supports_fs_stats());
    }

    #[tokio::test]
    async fn test_register_reads_daemon_info() {
        let registry = FactoryRegistry::new();
        let docker = FakeDocker {
            info: serde_json::from_str(
                r#"{"Driver": "devicemapper", "DriverStatus": [["Pool Name", "docker-pool"]], "DockerRootDir": "/data/docker"}"#,
            )
            .unwrap(),
            version: "20.10.7".to_owned(),
            ..FakeDocker::default()
        };

        register(
            &registry,
            Arc::new(docker),
            collaborators(),
            subsystems(),
            DockerOptions::default(),
        )
        .await
        .unwrap();

        let info = &registry.debug_info()["docker"];
        assert_eq!(info["Storage driver"], vec!["devicemapper".to_owned()]);
        assert_eq!(info["Storage dir"], vec!["/data/docker".to_owned()]);
        assert_eq!(info["Thin pool"], vec!["docker-pool".to_owned()]);
    }

    #[tokio::test]
    async fn test_register_is_all_or_nothing() {
        let registry = FactoryRegistry::new();
        let docker = FakeDocker {
            version: "20.10.7".to_owned(),
            ..FakeDocker::default()
        };
        let err = register(
            &registry,
            Arc::new(docker),
            collaborators(),
            CgroupSubsystems::default(),
            DockerOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NoCgroups));
        assert!(!registry.has_factories());

        let docker = FakeDocker {
            version: "garbage".to_owned(),
            ..FakeDocker::default()
        };
        let err = register(
            &registry,
            Arc::new(docker),
            collaborators(),
            subsystems(),
            DockerOptions {
                metrics: MetricSet::all().without([MetricKind::DiskUsage]),
                ..DockerOptions::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Client(client::Error::InvalidVersion(_))));
        assert!(!registry.has_factories());
    }
}
