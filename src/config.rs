//! Environment-variable driven settings of the collector binary.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::container::{MetricKind, MetricSet};

const DEFAULT_ROOTFS: &str = "/rootfs";
const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Mount point of the host's root filesystem when running in a container.
    pub rootfs: PathBuf,
    pub docker_socket: PathBuf,
    /// Overrides the root directory reported by the Docker daemon.
    pub docker_root: Option<PathBuf>,
    /// Leave cgroups that belong to no runtime untracked (except the root and the whitelist).
    pub docker_only: bool,
    pub raw_cgroup_prefix_whitelist: Vec<String>,
    pub docker_env_metadata_whitelist: Vec<String>,
    pub metrics: MetricSet,
    pub housekeeping_interval: Duration,
    pub fs_usage_period: Duration,
    /// Receive timeout of the taskstats socket; `None` blocks.
    pub netlink_timeout: Option<Duration>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            rootfs: PathBuf::from(DEFAULT_ROOTFS),
            docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
            docker_root: None,
            docker_only: false,
            raw_cgroup_prefix_whitelist: Vec::new(),
            docker_env_metadata_whitelist: Vec::new(),
            metrics: MetricSet::all(),
            housekeeping_interval: Duration::from_secs(1),
            fs_usage_period: crate::fs::DEFAULT_PERIOD,
            netlink_timeout: None,
        }
    }
}

impl CollectorConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a variable is set to something unparsable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a variable
    /// if it is set. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a variable is set to something unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(rootfs) = get("ROOTFS_MOUNT_PATH") {
            config.rootfs = PathBuf::from(rootfs);
        }
        if let Some(socket) = get("DOCKER_SOCKET") {
            config.docker_socket = PathBuf::from(socket);
        }
        config.docker_root = get("DOCKER_ROOT").map(PathBuf::from);
        if let Some(value) = get("DOCKER_ONLY") {
            config.docker_only = parse("DOCKER_ONLY", &value)?;
        }
        if let Some(value) = get("RAW_CGROUP_PREFIX_WHITELIST") {
            config.raw_cgroup_prefix_whitelist = split_list(&value);
        }
        if let Some(value) = get("DOCKER_ENV_METADATA_WHITELIST") {
            config.docker_env_metadata_whitelist = split_list(&value);
        }
        if let Some(value) = get("DISABLE_METRICS") {
            let disabled = split_list(&value)
                .iter()
                .map(|kind| parse::<MetricKind>("DISABLE_METRICS", kind))
                .collect::<Result<Vec<_>>>()?;
            config.metrics = config.metrics.without(disabled);
        }
        if let Some(value) = get("HOUSEKEEPING_INTERVAL_SECS") {
            config.housekeeping_interval = positive_duration(
                "HOUSEKEEPING_INTERVAL_SECS",
                &value,
                Duration::from_secs,
            )?;
        }
        if let Some(value) = get("FS_USAGE_PERIOD_SECS") {
            config.fs_usage_period =
                positive_duration("FS_USAGE_PERIOD_SECS", &value, Duration::from_secs)?;
        }
        if let Some(value) = get("NETLINK_TIMEOUT_MS") {
            config.netlink_timeout = Some(positive_duration(
                "NETLINK_TIMEOUT_MS",
                &value,
                Duration::from_millis,
            )?);
        }

        Ok(config)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| Error::InvalidValue {
        key,
        value: value.to_owned(),
        reason: err.to_string(),
    })
}

fn positive_duration(
    key: &'static str,
    value: &str,
    unit: fn(u64) -> Duration,
) -> Result<Duration> {
    match parse::<u64>(key, value)? {
        0 => Err(Error::InvalidValue {
            key,
            value: value.to_owned(),
            reason: "must be greater than zero".to_owned(),
        }),
        n => Ok(unit(n)),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<CollectorConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        CollectorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config, CollectorConfig::default());
        assert_eq!(config.rootfs, PathBuf::from("/rootfs"));
        assert_eq!(config.docker_socket, PathBuf::from("/var/run/docker.sock"));
        assert_eq!(config.housekeeping_interval, Duration::from_secs(1));
        assert_eq!(config.fs_usage_period, Duration::from_secs(60));
        assert!(config.netlink_timeout.is_none());
        assert!(config.metrics.has(MetricKind::CpuLoad));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("ROOTFS_MOUNT_PATH", "/host"),
            ("DOCKER_ROOT", "/data/docker"),
            ("DOCKER_ONLY", "true"),
            ("RAW_CGROUP_PREFIX_WHITELIST", "/system.slice, ,/kubepods"),
            ("DOCKER_ENV_METADATA_WHITELIST", "HOME"),
            ("DISABLE_METRICS", "cpuLoad,disk"),
            ("HOUSEKEEPING_INTERVAL_SECS", "5"),
            ("NETLINK_TIMEOUT_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.rootfs, PathBuf::from("/host"));
        assert_eq!(config.docker_root, Some(PathBuf::from("/data/docker")));
        assert!(config.docker_only);
        assert_eq!(
            config.raw_cgroup_prefix_whitelist,
            vec!["/system.slice".to_owned(), "/kubepods".to_owned()]
        );
        assert_eq!(config.docker_env_metadata_whitelist, vec!["HOME".to_owned()]);
        assert!(!config.metrics.has(MetricKind::CpuLoad));
        assert!(!config.metrics.has(MetricKind::DiskUsage));
        assert!(config.metrics.has(MetricKind::Network));
        assert_eq!(config.housekeeping_interval, Duration::from_secs(5));
        assert_eq!(config.netlink_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_empty_value_is_unset() {
        let config = config(&[("DOCKER_SOCKET", ""), ("DOCKER_ROOT", "  ")]).unwrap();
        assert_eq!(config.docker_socket, PathBuf::from("/var/run/docker.sock"));
        assert!(config.docker_root.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("DOCKER_ONLY", "yes")]),
            Err(Error::InvalidValue { key: "DOCKER_ONLY", .. })
        ));
        assert!(matches!(
            config(&[("DISABLE_METRICS", "tcp")]),
            Err(Error::InvalidValue { key: "DISABLE_METRICS", .. })
        ));
        assert!(matches!(
            config(&[("FS_USAGE_PERIOD_SECS", "0")]),
            Err(Error::InvalidValue { key: "FS_USAGE_PERIOD_SECS", .. })
        ));
    }
}
