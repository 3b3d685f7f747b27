//! Records exchanged between container handlers and their callers.
//!
//! Everything here is plain data: a handler builds a fresh [`ContainerSpec`] or
//! [`ContainerStats`] on every call and never mutates it after returning it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Immutable identity of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerReference {
    /// Runtime-assigned id (empty for raw cgroups).
    pub id: String,
    /// Absolute cgroup name, e.g. `/system.slice/docker-<id>.scope`.
    pub name: String,
    /// Other names the container is known by.
    pub aliases: Vec<String>,
    /// Namespace of the owning runtime, e.g. `docker`.
    pub namespace: String,
}

/// Declared configuration of a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContainerSpec {
    pub creation_time: Option<DateTime<Utc>>,
    pub labels: HashMap<String, String>,
    pub envs: HashMap<String, String>,
    pub image: String,
    pub has_cpu: bool,
    pub has_memory: bool,
    pub has_network: bool,
    pub has_filesystem: bool,
    pub has_diskio: bool,
    pub has_processes: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuStats {
    pub usage_total_ns: u64,
    pub usage_user_ns: u64,
    pub usage_system_ns: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub usage_bytes: u64,
    pub working_set_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub interfaces: Vec<InterfaceStats>,
}

/// Per-block-device I/O counters keyed by the kernel's major:minor numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerDiskStats {
    pub major: u64,
    pub minor: u64,
    /// Device name, filled from the machine's disk map when known.
    pub device: String,
    pub stats: HashMap<String, u64>,
}

/// Usage of one filesystem attributed to a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FsStats {
    pub device: String,
    pub fs_type: String,
    /// Capacity of the backing filesystem in bytes.
    pub limit: u64,
    /// Bytes of the container's own writable layer or pool allocation.
    pub base_usage: u64,
    pub usage: u64,
    pub inodes: u64,
}

/// Instantaneous task counts of a cgroup, per scheduling state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub nr_sleeping: u64,
    pub nr_running: u64,
    pub nr_stopped: u64,
    pub nr_uninterruptible: u64,
    pub nr_io_wait: u64,
}

/// One timestamped sample of a container's resource usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerStats {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub network: NetworkStats,
    pub filesystem: Vec<FsStats>,
    pub disk_io: Vec<PerDiskStats>,
    pub task_stats: LoadStats,
}

impl ContainerStats {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu: CpuStats::default(),
            memory: MemoryStats::default(),
            network: NetworkStats::default(),
            filesystem: Vec::new(),
            disk_io: Vec::new(),
            task_stats: LoadStats::default(),
        }
    }
}
