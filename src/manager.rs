use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::cgroup::{self, CgroupSubsystems};
use crate::container::{self, ContainerHandler, FactoryRegistry, WatchSource};
use crate::info::{ContainerReference, ContainerStats};

/// One polled stats sample together with the container it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSample {
    pub reference: ContainerReference,
    pub stats: ContainerStats,
}

/// Tracks one handler per live cgroup.
///
/// [`Manager::discover`] walks the cgroup tree and builds handlers for new cgroups
/// through the registry; [`Manager::collect_stats`] polls them and retires the ones
/// whose cgroups are gone.
pub struct Manager {
    registry: Arc<FactoryRegistry>,
    subsystems: CgroupSubsystems,
    in_host_namespace: bool,
    handlers: DashMap<String, Box<dyn ContainerHandler>>,
}

impl Manager {
    pub fn new(
        registry: Arc<FactoryRegistry>,
        subsystems: CgroupSubsystems,
        in_host_namespace: bool,
    ) -> Self {
        Self {
            registry,
            subsystems,
            in_host_namespace,
            handlers: DashMap::new(),
        }
    }

    /// Builds and starts handlers for every cgroup not tracked yet. Returns how many
    /// were added.
    ///
    /// A failing factory only skips the affected cgroup.
    ///
    /// # Errors
    ///
    /// Returns [`container::Error::Cgroup`] if the cgroup tree cannot be listed.
    pub async fn discover(&self) -> container::Result<usize> {
        let root_paths = self.subsystems.cgroup_paths("/");
        let mut names = cgroup::list_child_cgroups(&root_paths, "/", true)?;
        names.insert("/".to_owned());

        let mut added = 0;
        for name in names {
            if self.handlers.contains_key(&name) {
                continue;
            }
            match self
                .registry
                .new_container_handler(&name, WatchSource::Raw, self.in_host_namespace)
                .await
            {
                Ok(Some(handler)) => {
                    handler.start();
                    log::debug!("tracking {} container `{}`", handler.container_type(), name);
                    self.handlers.insert(name, handler);
                    added += 1;
                }
                Ok(None) => {}
                Err(container::Error::AlreadyClaimed(name)) => {
                    log::debug!("container `{name}` is owned elsewhere");
                }
                Err(err) => log::warn!("{err}"),
            }
        }

        Ok(added)
    }

    /// Polls every tracked handler and appends one sample per container to `out`.
    ///
    /// Handlers whose cgroups no longer exist are cleaned up and their names released.
    pub fn collect_stats(&self, out: &mut Vec<StatsSample>) {
        self.handlers.retain(|name, handler| {
            if !handler.exists() {
                log::debug!("container `{name}` is gone");
                handler.cleanup();
                self.registry.release(name);
                return false;
            }

            match handler.stats() {
                Ok(stats) => out.push(StatsSample {
                    reference: handler.container_reference(),
                    stats,
                }),
                Err(err) => log::debug!("failed reading stats of container `{name}`: {err}"),
            }
            true
        });
    }

    /// Stops all handlers and forgets them.
    pub fn shutdown(&self) {
        self.handlers.retain(|name, handler| {
            handler.cleanup();
            self.registry.release(name);
            false
        });
    }

    pub fn size(&self) -> usize {
        self.handlers.len()
    }
}
