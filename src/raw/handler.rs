use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::cgroup::{self, CgroupSubsystems};
use crate::container::{
    self, Collaborators, ContainerHandler, ContainerType, ListType, MetricKind, MetricSet,
};
use crate::error::ResultOkLogExt;
use crate::info::{ContainerReference, ContainerSpec, ContainerStats};

/// Handler of a plain cgroup, identified by its name only.
///
/// The root cgroup stands for the whole machine and reports the network of the
/// host's init process.
pub struct RawContainerHandler {
    reference: ContainerReference,
    subsystems: CgroupSubsystems,
    cgroup_paths: HashMap<String, PathBuf>,
    labels: HashMap<String, String>,
    metrics: MetricSet,
    collaborators: Collaborators,
}

impl RawContainerHandler {
    pub fn new(
        name: &str,
        subsystems: CgroupSubsystems,
        collaborators: Collaborators,
        metrics: MetricSet,
    ) -> Self {
        let cgroup_paths = subsystems.cgroup_paths(name);
        Self {
            reference: ContainerReference {
                name: name.to_owned(),
                ..ContainerReference::default()
            },
            subsystems,
            cgroup_paths,
            labels: HashMap::new(),
            metrics,
            collaborators,
        }
    }

    fn is_root(&self) -> bool {
        self.reference.name == "/"
    }

    fn needs_net(&self) -> bool {
        self.is_root() && self.metrics.has(MetricKind::Network)
    }

    fn children(&self, list_type: ListType) -> container::Result<BTreeSet<String>> {
        Ok(cgroup::list_child_cgroups(
            &self.cgroup_paths,
            &self.reference.name,
            list_type == ListType::Recursive,
        )?)
    }
}

impl ContainerHandler for RawContainerHandler {
    fn container_reference(&self) -> ContainerReference {
        self.reference.clone()
    }

    fn spec(&self) -> container::Result<ContainerSpec> {
        let mut spec = self.collaborators.cgroups.spec(&self.cgroup_paths)?;
        spec.has_network = self.needs_net();
        Ok(spec)
    }

    fn stats(&self) -> container::Result<ContainerStats> {
        let needs_net = self.needs_net();
        let mut stats = self
            .collaborators
            .cgroups
            .stats(&self.cgroup_paths, needs_net.then_some(1))?;
        if !needs_net {
            stats.network = Default::default();
        }

        if self.metrics.has(MetricKind::CpuLoad) {
            if let (Some(reader), Some(path)) =
                (&self.collaborators.load_reader, self.cgroup_paths.get("cpu"))
            {
                if let Some(load) = reader
                    .cpu_load(&self.reference.name, path)
                    .ok_log(log::Level::Debug)
                {
                    stats.task_stats = load;
                }
            }
        }

        if self.metrics.has(MetricKind::DiskIo) && !stats.disk_io.is_empty() {
            if let Some(machine) = self
                .collaborators
                .machine
                .machine_info()
                .ok_log(log::Level::Debug)
            {
                for disk in &mut stats.disk_io {
                    if let Some(device) = machine.device_name(disk.major, disk.minor) {
                        disk.device = device.to_owned();
                    }
                }
            }
        }

        Ok(stats)
    }

    fn list_containers(&self, list_type: ListType) -> container::Result<Vec<ContainerReference>> {
        Ok(self
            .children(list_type)?
            .into_iter()
            .map(|name| ContainerReference {
                name,
                ..ContainerReference::default()
            })
            .collect())
    }

    fn cgroup_path(&self, resource: &str) -> container::Result<&Path> {
        self.cgroup_paths
            .get(resource)
            .map(PathBuf::as_path)
            .ok_or_else(|| container::Error::CgroupPathNotFound {
                resource: resource.to_owned(),
                container: self.reference.name.clone(),
            })
    }

    fn container_labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    fn container_ip_address(&self) -> &str {
        ""
    }

    fn list_processes(&self, list_type: ListType) -> container::Result<Vec<u32>> {
        let mut pids = self.collaborators.cgroups.processes(&self.cgroup_paths)?;
        if list_type == ListType::Recursive {
            for child in self.children(ListType::Recursive)? {
                let paths = self.subsystems.cgroup_paths(&child);
                pids.extend(self.collaborators.cgroups.processes(&paths)?);
            }
            pids.sort_unstable();
            pids.dedup();
        }
        Ok(pids)
    }

    fn exists(&self) -> bool {
        cgroup::cgroup_exists(&self.cgroup_paths)
    }

    fn container_type(&self) -> ContainerType {
        ContainerType::Raw
    }

    fn start(&self) {}

    fn cleanup(&self) {}
}
