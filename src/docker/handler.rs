use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::cgroup;
use crate::container::{
    self, Collaborators, ContainerHandler, ContainerType, ListType, MetricKind, MetricSet,
};
use crate::error::ResultOkLogExt;
use crate::fs::{DriverUsageCorrector, FsHandler, FsUsageSampler};
use crate::info::{ContainerReference, ContainerSpec, ContainerStats, FsStats};
use crate::machine::MachineInfo;

use super::client::ContainerJson;
use super::{DOCKER_NAMESPACE, DockerApi, DockerSettings, Error, Result, StorageDriver, layer};

const NETWORK_MODE_CONTAINER_PREFIX: &str = "container:";

/// Handler of one Docker container.
///
/// Identity and configuration are captured from a single inspect at construction;
/// only the statistics are read live.
pub struct DockerContainerHandler {
    reference: ContainerReference,
    cgroup_paths: HashMap<String, PathBuf>,
    creation_time: DateTime<Utc>,
    labels: HashMap<String, String>,
    envs: HashMap<String, String>,
    image: String,
    network_mode: String,
    ip_address: String,
    pid: u32,
    driver: StorageDriver,
    rootfs_storage_dir: Option<PathBuf>,
    thin_pool_name: String,
    zfs_parent: String,
    fs_handler: Option<DriverUsageCorrector>,
    metrics: MetricSet,
    collaborators: Collaborators,
}

impl DockerContainerHandler {
    /// Inspects the container and prepares its filesystem accounting.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadMountId`] if the writable layer cannot be located.
    /// - [`Error::Inspect`] if the container, or the one whose network it joins,
    ///   cannot be inspected.
    /// - [`Error::InvalidCreated`] if the creation time is not RFC 3339.
    pub async fn new(
        name: &str,
        client: &dyn DockerApi,
        settings: &DockerSettings,
        collaborators: Collaborators,
        in_host_namespace: bool,
    ) -> Result<Self> {
        let options = &settings.options;
        let cgroup_paths = settings.subsystems.cgroup_paths(name);

        let storage_dir = if in_host_namespace {
            settings.storage_dir.clone()
        } else {
            cgroup::join_absolute(&options.rootfs_prefix, &settings.storage_dir)
        };
        let id = layer::container_name_to_docker_id(name);
        let log_dir = layer::log_dir(&storage_dir, &id);
        let rw_layer_id = layer::rw_layer_id(&id, &storage_dir, &settings.driver, settings.version)?;
        let rootfs_storage_dir = layer::rootfs_storage_dir(&storage_dir, &settings.driver, &rw_layer_id);
        let zfs_filesystem = (settings.driver == StorageDriver::Zfs)
            .then(|| layer::zfs_filesystem(&settings.zfs_parent, &rw_layer_id));

        let inspect = inspect(client, &id).await?;
        let creation_time = DateTime::parse_from_rfc3339(&inspect.created)
            .map_err(|source| Error::InvalidCreated {
                id: id.clone(),
                value: inspect.created.clone(),
                source,
            })?
            .with_timezone(&Utc);

        let mut ip_address = inspect.network_settings.ip_address.clone();
        let network_mode = inspect.host_config.network_mode.clone();
        if ip_address.is_empty() {
            if let Some(other) = network_mode.strip_prefix(NETWORK_MODE_CONTAINER_PREFIX) {
                ip_address = inspect_network_peer(client, other).await?;
            }
        }

        let fs_handler = options.metrics.has(MetricKind::DiskUsage).then(|| {
            let sampler = FsUsageSampler::new(
                options.sampler_period,
                rootfs_storage_dir.clone(),
                Some(log_dir),
            );
            let mut corrector = DriverUsageCorrector::new(sampler);
            let device_id = inspect
                .graph_driver
                .data
                .as_ref()
                .and_then(|data| data.get("DeviceId"));
            if let (StorageDriver::Devicemapper, Some(watcher), Some(device_id)) =
                (&settings.driver, &options.thin_pool_watcher, device_id)
            {
                corrector = corrector.with_thin_pool(watcher.clone(), device_id.clone());
            }
            if let (Some(watcher), Some(filesystem)) = (&options.zfs_watcher, &zfs_filesystem) {
                corrector = corrector.with_zfs(watcher.clone(), filesystem.clone());
            }
            corrector
        });

        let mut labels = inspect.config.labels.clone().unwrap_or_default();
        if inspect.restart_count > 0 {
            labels.insert("restartcount".to_owned(), inspect.restart_count.to_string());
        }
        let envs = whitelisted_envs(
            inspect.config.env.as_deref().unwrap_or_default(),
            &options.env_metadata_whitelist,
        );

        let mut aliases = Vec::with_capacity(2);
        let container_name = inspect.name.trim_start_matches('/');
        if !container_name.is_empty() {
            aliases.push(container_name.to_owned());
        }
        aliases.push(id.clone());

        log::debug!(
            "created docker handler for `{}` (driver `{}`, rootfs `{}`)",
            name,
            settings.driver,
            rootfs_storage_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default()
        );

        Ok(Self {
            reference: ContainerReference {
                id,
                name: name.to_owned(),
                aliases,
                namespace: DOCKER_NAMESPACE.to_owned(),
            },
            cgroup_paths,
            creation_time,
            labels,
            envs,
            image: inspect.config.image.clone(),
            network_mode,
            ip_address,
            pid: inspect.state.pid,
            driver: settings.driver.clone(),
            rootfs_storage_dir,
            thin_pool_name: settings.thin_pool_name.clone(),
            zfs_parent: settings.zfs_parent.clone(),
            fs_handler,
            metrics: options.metrics.clone(),
            collaborators,
        })
    }

    /// Whether the container owns its network namespace and network metrics are wanted.
    fn needs_net(&self) -> bool {
        self.metrics.has(MetricKind::Network)
            && !self.network_mode.starts_with(NETWORK_MODE_CONTAINER_PREFIX)
    }

    fn fs_stats(&self, machine: &MachineInfo) -> Option<FsStats> {
        let fs_handler = self.fs_handler.as_ref()?;
        let device = match &self.driver {
            StorageDriver::Devicemapper => self.thin_pool_name.clone(),
            StorageDriver::Aufs | StorageDriver::Overlay | StorageDriver::Overlay2 => {
                let dir = self.rootfs_storage_dir.as_deref()?;
                self.collaborators
                    .fs_info
                    .dir_fs_device(dir)
                    .ok_log(log::Level::Debug)?
                    .device
            }
            StorageDriver::Zfs => self.zfs_parent.clone(),
            StorageDriver::Other(_) => return None,
        };

        let (limit, fs_type) = machine
            .filesystem(&device)
            .map(|fs| (fs.capacity, fs.fs_type.clone()))
            .unwrap_or_default();
        let usage = fs_handler.usage();
        Some(FsStats {
            device,
            fs_type,
            limit,
            base_usage: usage.base_usage_bytes,
            usage: usage.total_usage_bytes,
            inodes: usage.inode_usage,
        })
    }
}

async fn inspect(client: &dyn DockerApi, id: &str) -> Result<ContainerJson> {
    client
        .inspect_container(id)
        .await
        .map_err(|source| Error::Inspect {
            id: id.to_owned(),
            source,
        })
}

/// IP address of the container whose network namespace is shared.
async fn inspect_network_peer(client: &dyn DockerApi, id: &str) -> Result<String> {
    Ok(inspect(client, id).await?.network_settings.ip_address)
}

/// Picks `KEY=VALUE` entries whose key is allow-listed, keyed by the lowercased name.
fn whitelisted_envs(env: &[String], whitelist: &[String]) -> HashMap<String, String> {
    let mut envs = HashMap::new();
    for name in whitelist.iter().filter(|name| !name.is_empty()) {
        for entry in env {
            if let Some((key, value)) = entry.split_once('=') {
                if key == name {
                    envs.insert(name.to_lowercase(), value.to_owned());
                }
            }
        }
    }
    envs
}

impl ContainerHandler for DockerContainerHandler {
    fn container_reference(&self) -> ContainerReference {
        self.reference.clone()
    }

    fn spec(&self) -> container::Result<ContainerSpec> {
        let mut spec = self.collaborators.cgroups.spec(&self.cgroup_paths)?;
        spec.labels = self.labels.clone();
        spec.envs = self.envs.clone();
        spec.image = self.image.clone();
        spec.creation_time = Some(self.creation_time);
        spec.has_network = self.needs_net();
        spec.has_filesystem =
            self.metrics.has(MetricKind::DiskUsage) && self.driver.supports_fs_stats();
        Ok(spec)
    }

    fn stats(&self) -> container::Result<ContainerStats> {
        let needs_net = self.needs_net();
        let mut stats = self
            .collaborators
            .cgroups
            .stats(&self.cgroup_paths, needs_net.then_some(self.pid))?;
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

        let wants_disk_io = self.metrics.has(MetricKind::DiskIo);
        let wants_fs = self.fs_handler.is_some();
        if wants_disk_io || wants_fs {
            if let Some(machine) = self
                .collaborators
                .machine
                .machine_info()
                .ok_log(log::Level::Debug)
            {
                if wants_disk_io {
                    for disk in &mut stats.disk_io {
                        if let Some(device) = machine.device_name(disk.major, disk.minor) {
                            disk.device = device.to_owned();
                        }
                    }
                }
                if let Some(fs) = self.fs_stats(&machine) {
                    stats.filesystem.push(fs);
                }
            }
        }

        Ok(stats)
    }

    fn list_containers(&self, _list_type: ListType) -> container::Result<Vec<ContainerReference>> {
        Ok(Vec::new())
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
        &self.ip_address
    }

    fn list_processes(&self, _list_type: ListType) -> container::Result<Vec<u32>> {
        Ok(self.collaborators.cgroups.processes(&self.cgroup_paths)?)
    }

    fn exists(&self) -> bool {
        cgroup::cgroup_exists(&self.cgroup_paths)
    }

    fn container_type(&self) -> ContainerType {
        ContainerType::Docker
    }

    fn start(&self) {
        if let Some(fs_handler) = &self.fs_handler {
            fs_handler.start();
        }
    }

    fn cleanup(&self) {
        if let Some(fs_handler) = &self.fs_handler {
            fs_handler.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::CgroupSubsystems;
    use crate::docker::client::{
        ContainerConfig, ContainerState, GraphDriver, HostConfig, NetworkSettings,
    };
    use crate::docker::testing::{FakeDocker, collaborators};
    use crate::docker::DockerOptions;
    use crate::error::BoxError;
    use crate::fs::UsageWatcher;
    use crate::info::NetworkStats;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    const ID: &str = "4f1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f8";
    const PEER: &str = "9a8b7c6d5e4f30211203f4e5d6c7b8a99a8b7c6d5e4f30211203f4e5d6c7b8a9";

    struct PoolWatcher;

    impl UsageWatcher for PoolWatcher {
        fn usage(&self, id: &str) -> std::result::Result<u64, BoxError> {
            match id {
                "pool-dev-1" => Ok(500_000),
                _ => Err("unknown device".into()),
            }
        }
    }

    fn container(id: &str, network_mode: &str, ip: &str) -> ContainerJson {
        ContainerJson {
            id: id.to_owned(),
            name: "/web".to_owned(),
            created: "2024-03-01T10:00:00.123456789Z".to_owned(),
            restart_count: 3,
            state: ContainerState {
                running: true,
                pid: 4242,
            },
            config: ContainerConfig {
                image: "nginx:1.25".to_owned(),
                labels: Some(HashMap::from([("app".to_owned(), "web".to_owned())])),
                env: Some(vec![
                    "PATH=/usr/bin".to_owned(),
                    "SERVICE_TIER=frontend".to_owned(),
                    "SECRET=hunter2".to_owned(),
                ]),
            },
            host_config: HostConfig {
                network_mode: network_mode.to_owned(),
            },
            network_settings: NetworkSettings {
                ip_address: ip.to_owned(),
            },
            graph_driver: GraphDriver {
                name: "devicemapper".to_owned(),
                data: Some(HashMap::from([(
                    "DeviceId".to_owned(),
                    "pool-dev-1".to_owned(),
                )])),
            },
        }
    }

    fn docker(containers: Vec<ContainerJson>) -> FakeDocker {
        FakeDocker {
            containers: containers.into_iter().map(|c| (c.id.clone(), c)).collect(),
            ..FakeDocker::default()
        }
    }

    fn settings(cgroup_root: &Path, driver: StorageDriver, storage_dir: &Path) -> DockerSettings {
        DockerSettings {
            subsystems: CgroupSubsystems::new(HashMap::from([
                ("cpu".to_owned(), cgroup_root.join("cpu")),
                ("memory".to_owned(), cgroup_root.join("memory")),
            ])),
            driver,
            storage_dir: storage_dir.to_path_buf(),
            version: [1, 9, 0],
            thin_pool_name: "docker-pool".to_owned(),
            zfs_parent: "tank/docker".to_owned(),
            options: DockerOptions {
                env_metadata_whitelist: vec!["SERVICE_TIER".to_owned()],
                thin_pool_watcher: Some(Arc::new(PoolWatcher)),
                ..DockerOptions::default()
            },
        }
    }

    async fn handler(
        docker: &FakeDocker,
        settings: &DockerSettings,
    ) -> Result<DockerContainerHandler> {
        DockerContainerHandler::new(
            &format!("/docker/{ID}"),
            docker,
            settings,
            collaborators(),
            true,
        )
        .await
    }

    #[tokio::test]
    async fn test_identity_and_spec() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = docker(vec![container(ID, "bridge", "172.17.0.2")]);
        let settings = settings(tmp.path(), StorageDriver::Devicemapper, tmp.path());
        let handler = handler(&docker, &settings).await.unwrap();

        let reference = handler.container_reference();
        assert_eq!(reference.id, ID);
        assert_eq!(reference.name, format!("/docker/{ID}"));
        assert_eq!(reference.aliases, vec!["web".to_owned(), ID.to_owned()]);
        assert_eq!(reference.namespace, "docker");
        assert_eq!(handler.container_ip_address(), "172.17.0.2");
        assert_eq!(handler.container_labels()["restartcount"], "3");
        assert_eq!(handler.container_type(), ContainerType::Docker);

        let spec = handler.spec().unwrap();
        assert_eq!(spec.image, "nginx:1.25");
        assert_eq!(spec.labels["app"], "web");
        assert_eq!(
            spec.envs,
            HashMap::from([("service_tier".to_owned(), "frontend".to_owned())])
        );
        assert_eq!(
            spec.creation_time.unwrap().timestamp_subsec_nanos(),
            123_456_789
        );
        assert!(spec.has_cpu);
        assert!(spec.has_network);
        assert!(spec.has_filesystem);
    }

    #[tokio::test]
    async fn test_shared_network_namespace_zeroes_network() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = docker(vec![
            container(ID, &format!("container:{PEER}"), ""),
            container(PEER, "bridge", "172.17.0.9"),
        ]);
        let settings = settings(tmp.path(), StorageDriver::Devicemapper, tmp.path());
        let handler = handler(&docker, &settings).await.unwrap();

        assert_eq!(handler.container_ip_address(), "172.17.0.9");
        assert_eq!(docker.inspects.load(Ordering::SeqCst), 2);
        assert!(!handler.spec().unwrap().has_network);
        assert_eq!(handler.stats().unwrap().network, NetworkStats::default());
    }

    #[tokio::test]
    async fn test_missing_network_peer_aborts_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = docker(vec![container(ID, &format!("container:{PEER}"), "")]);
        let settings = settings(tmp.path(), StorageDriver::Devicemapper, tmp.path());

        let err = handler(&docker, &settings).await.err().unwrap();
        assert!(matches!(err, Error::Inspect { id, .. } if id == PEER));
    }

    #[tokio::test]
    async fn test_invalid_creation_time_aborts_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let mut json = container(ID, "bridge", "172.17.0.2");
        json.created = "yesterday".to_owned();
        let docker = docker(vec![json]);
        let settings = settings(tmp.path(), StorageDriver::Devicemapper, tmp.path());

        let err = handler(&docker, &settings).await.err().unwrap();
        assert!(matches!(err, Error::InvalidCreated { .. }));
    }

    #[tokio::test]
    async fn test_stats_with_thin_pool_overlay() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = docker(vec![container(ID, "bridge", "172.17.0.2")]);
        let settings = settings(tmp.path(), StorageDriver::Devicemapper, tmp.path());
        let handler = handler(&docker, &settings).await.unwrap();

        let stats = handler.stats().unwrap();
        assert_eq!(stats.network.interfaces.len(), 1);
        assert_eq!(stats.task_stats.nr_running, 3);
        assert_eq!(stats.disk_io[0].device, "/dev/sda");
        assert_eq!(
            stats.filesystem,
            vec![FsStats {
                device: "docker-pool".to_owned(),
                fs_type: "devicemapper".to_owned(),
                limit: 10_000_000,
                base_usage: 500_000,
                usage: 500_000,
                inodes: 0,
            }]
        );
    }

    #[tokio::test]
    async fn test_overlay2_layout_and_device() {
        let storage = tempfile::tempdir().unwrap();
        let mounts = storage
            .path()
            .join(format!("image/overlay2/layerdb/mounts/{ID}"));
        std::fs::create_dir_all(&mounts).unwrap();
        std::fs::write(mounts.join("mount-id"), "f00dcafe\n").unwrap();

        let docker = docker(vec![container(ID, "bridge", "172.17.0.2")]);
        let mut settings = settings(storage.path(), StorageDriver::Overlay2, storage.path());
        settings.version = [1, 11, 0];
        let handler = handler(&docker, &settings).await.unwrap();

        assert_eq!(
            handler.rootfs_storage_dir,
            Some(storage.path().join("overlay2/f00dcafe/diff"))
        );
        let stats = handler.stats().unwrap();
        assert_eq!(stats.filesystem[0].device, "/dev/sda1");
        assert_eq!(stats.filesystem[0].limit, 20_000_000);
    }

    #[tokio::test]
    async fn test_storage_dir_rerooted_outside_host_namespace() {
        let rootfs = tempfile::tempdir().unwrap();
        let docker = docker(vec![container(ID, "bridge", "172.17.0.2")]);
        let mut settings = settings(rootfs.path(), StorageDriver::Aufs, Path::new("/var/lib/docker"));
        settings.options.rootfs_prefix = rootfs.path().to_path_buf();

        let handler = DockerContainerHandler::new(
            &format!("/docker/{ID}"),
            &docker,
            &settings,
            collaborators(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(
            handler.rootfs_storage_dir,
            Some(rootfs.path().join(format!("var/lib/docker/aufs/diff/{ID}")))
        );
    }

    #[tokio::test]
    async fn test_disabled_metrics() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = docker(vec![container(ID, "bridge", "172.17.0.2")]);
        let mut settings = settings(tmp.path(), StorageDriver::Devicemapper, tmp.path());
        settings.options.metrics = MetricSet::all().without([
            MetricKind::Network,
            MetricKind::DiskUsage,
            MetricKind::CpuLoad,
            MetricKind::DiskIo,
        ]);
        let handler = handler(&docker, &settings).await.unwrap();

        let stats = handler.stats().unwrap();
        assert!(stats.network.interfaces.is_empty());
        assert!(stats.filesystem.is_empty());
        assert_eq!(stats.task_stats.nr_running, 0);
        assert_eq!(stats.disk_io[0].device, "");
        assert!(!handler.spec().unwrap().has_filesystem);
    }

    #[tokio::test]
    async fn test_cgroup_paths_and_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = docker(vec![container(ID, "bridge", "172.17.0.2")]);
        let settings = settings(tmp.path(), StorageDriver::Devicemapper, tmp.path());
        let handler = handler(&docker, &settings).await.unwrap();

        assert_eq!(
            handler.cgroup_path("cpu").unwrap(),
            tmp.path().join(format!("cpu/docker/{ID}"))
        );
        assert!(matches!(
            handler.cgroup_path("pids"),
            Err(container::Error::CgroupPathNotFound { .. })
        ));
        assert!(!handler.exists());
        std::fs::create_dir_all(tmp.path().join(format!("cpu/docker/{ID}"))).unwrap();
        std::fs::create_dir_all(tmp.path().join(format!("memory/docker/{ID}"))).unwrap();
        assert!(handler.exists());

        assert_eq!(handler.list_processes(ListType::SelfOnly).unwrap(), vec![1, 2]);
        assert!(handler.list_containers(ListType::Recursive).unwrap().is_empty());

        handler.start();
        handler.cleanup();
        handler.cleanup();
    }

    #[test]
    fn test_whitelisted_envs() {
        let env = vec!["A=1".to_owned(), "B=x=y".to_owned(), "NOEQ".to_owned()];
        let envs = whitelisted_envs(&env, &["B".to_owned(), "NOEQ".to_owned(), String::new()]);
        assert_eq!(envs, HashMap::from([("b".to_owned(), "x=y".to_owned())]));
    }
}
