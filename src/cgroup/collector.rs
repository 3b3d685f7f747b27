use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil;
use crate::info::{ContainerSpec, ContainerStats};

use super::{Error, Result};

/// Extracts a container's spec, stats and processes from its cgroups.
///
/// `paths` maps subsystem names to the container's absolute cgroup directory in that
/// hierarchy.
pub trait CgroupCollector: Send + Sync {
    fn spec(&self, paths: &HashMap<String, PathBuf>) -> Result<ContainerSpec>;

    /// Takes a stats sample. `pid` is a process inside the container's network
    /// namespace, if it owns one.
    fn stats(&self, paths: &HashMap<String, PathBuf>, pid: Option<u32>) -> Result<ContainerStats>;

    /// Process ids that are direct members of the cgroup.
    fn processes(&self, paths: &HashMap<String, PathBuf>) -> Result<Vec<u32>>;
}

/// Collector that only inspects cgroup membership.
///
/// Resource counters are left zeroed; it exists so the collector can run without a
/// full stats backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicCgroupCollector;

impl CgroupCollector for BasicCgroupCollector {
    fn spec(&self, paths: &HashMap<String, PathBuf>) -> Result<ContainerSpec> {
        let has = |subsystem: &str| paths.get(subsystem).is_some_and(|p| p.exists());
        Ok(ContainerSpec {
            has_cpu: has("cpu") || has("cpuacct"),
            has_memory: has("memory"),
            has_diskio: has("blkio") || has("io"),
            has_processes: has("pids"),
            ..ContainerSpec::default()
        })
    }

    fn stats(&self, _paths: &HashMap<String, PathBuf>, _pid: Option<u32>) -> Result<ContainerStats> {
        Ok(ContainerStats::new(chrono::Utc::now()))
    }

    fn processes(&self, paths: &HashMap<String, PathBuf>) -> Result<Vec<u32>> {
        let Some(path) = paths.get("cpu").or_else(|| {
            let mut subsystems: Vec<_> = paths.keys().collect();
            subsystems.sort();
            subsystems.first().and_then(|s| paths.get(*s))
        }) else {
            return Ok(Vec::new());
        };
        read_pids(&path.join("cgroup.procs"))
    }
}

fn read_pids(path: &Path) -> Result<Vec<u32>> {
    let reader = fsutil::open_file_reader(path).map_err(|err| Error::Read {
        path: err.path,
        source: err.source,
    })?;

    let mut pids = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let pid = line.parse::<u32>().map_err(|_| Error::InvalidPid {
            path: path.to_path_buf(),
            line: index + 1,
            value: line.to_owned(),
        })?;
        pids.push(pid);
    }
    pids.sort_unstable();
    pids.dedup();

    Ok(pids)
}
