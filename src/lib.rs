use std::io::Write;
use std::sync::Arc;

use config::CollectorConfig;
use container::{Collaborators, FactoryRegistry, MetricKind};
use cpuload::LoadReader;
use docker::{DockerClient, DockerOptions};
use error::ResultOkLogExt;
use raw::RawOptions;

/// Creo Collector: a host-level resource-usage collector for containers.
///
/// Cgroups are discovered from the mounted hierarchies and resolved to a runtime
/// (Docker, or plain cgroups) through a [`container::FactoryRegistry`]. Every
/// resulting handler reports specs and point-in-time stats, including filesystem
/// usage sampled in the background and task counts read over taskstats netlink.
pub mod cgroup;
pub mod config;
pub mod container;
pub mod cpuload;
pub mod docker;
pub mod environment;
pub mod error;
pub mod fs;
pub mod fsutil;
pub mod info;
pub mod machine;
pub mod manager;
pub mod mountinfo;
pub mod raw;

/// Runs the collector until the process is terminated.
///
/// Registers the Docker factory (if the daemon answers) ahead of the raw factory,
/// then rescans the cgroup tree and prints one JSON line per container sample on
/// every housekeeping tick.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration variables.
/// - Running in a container without the host root mounted.
/// - No cgroup hierarchy being mounted.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = CollectorConfig::from_env()?;
    let runtime_env = environment::detect_runtime_environment(&config.rootfs);
    let host_root = runtime_env.host_root(&config.rootfs)?;
    log::debug!(
        "runtime environment: {:?}, host root: {}",
        runtime_env,
        host_root.display()
    );

    let mountinfo_path = host_root.join("proc/1/mountinfo");
    let subsystems = cgroup::CgroupSubsystems::from_mountinfo(&mountinfo_path, &host_root)?;
    log::debug!("cgroup mounts: {:?}", subsystems.mount_points());

    let load_reader = if config.metrics.has(MetricKind::CpuLoad) {
        open_load_reader(&config)
    } else {
        None
    };
    let collaborators = Collaborators {
        machine: Arc::new(machine::MountInfoMachine::new(&host_root)),
        fs_info: Arc::new(fs::MountInfoFsInfo::new(&mountinfo_path)),
        cgroups: Arc::new(cgroup::BasicCgroupCollector),
        load_reader,
    };

    let registry = Arc::new(FactoryRegistry::new());
    let docker_options = DockerOptions {
        root_dir: config.docker_root.clone(),
        rootfs_prefix: config.rootfs.clone(),
        env_metadata_whitelist: config.docker_env_metadata_whitelist.clone(),
        metrics: config.metrics.clone(),
        sampler_period: config.fs_usage_period,
        ..DockerOptions::default()
    };
    if let Err(err) = docker::register(
        &registry,
        Arc::new(DockerClient::new(&config.docker_socket)),
        collaborators.clone(),
        subsystems.clone(),
        docker_options,
    )
    .await
    {
        log::warn!("docker support disabled: {err}");
    }
    raw::register(
        &registry,
        collaborators,
        subsystems.clone(),
        RawOptions {
            prefix_whitelist: config.raw_cgroup_prefix_whitelist.clone(),
            runtime_only: config.docker_only,
            metrics: config.metrics.clone(),
        },
    )?;
    log::debug!("registered factories: {:?}", registry.debug_info());

    let manager = Arc::new(manager::Manager::new(
        Arc::clone(&registry),
        subsystems,
        runtime_env.in_host_namespace(),
    ));

    let mut interval = tokio::time::interval(config.housekeeping_interval);
    loop {
        interval.tick().await;
        manager.discover().await.ok_log(log::Level::Warn);

        let samples = {
            let manager = Arc::clone(&manager);
            tokio::task::spawn_blocking(move || {
                let mut out = Vec::with_capacity(manager.size());
                let before = std::time::Instant::now();
                manager.collect_stats(&mut out);
                log::trace!("collect_stats() took {} microseconds", before.elapsed().as_micros());
                out
            })
            .await?
        };

        write_samples(&samples)?;
    }
}

/// Prints one JSON document per sample to stdout.
fn write_samples(samples: &[manager::StatsSample]) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout().lock();
    for sample in samples {
        serde_json::to_writer(&mut stdout, sample)?;
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

fn open_load_reader(config: &CollectorConfig) -> Option<Arc<dyn LoadReader>> {
    let reader = cpuload::NetlinkReader::new().and_then(|reader| match config.netlink_timeout {
        Some(timeout) => reader.with_receive_timeout(timeout),
        None => Ok(reader),
    });
    match reader {
        Ok(reader) => Some(Arc::new(reader) as Arc<dyn LoadReader>),
        Err(err) => {
            log::warn!("cpu load collection disabled: {err}");
            None
        }
    }
}
