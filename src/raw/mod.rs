//! Fallback support for cgroups that belong to no container runtime.

use std::sync::Arc;

use crate::cgroup::CgroupSubsystems;
use crate::container::{Collaborators, FactoryRegistry, MetricSet, WatchSource};

mod factory;
mod handler;

pub use factory::RawFactory;
pub use handler::RawContainerHandler;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no cgroup subsystems available")]
    NoCgroups,
}

/// Which raw cgroups to track.
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    /// Cgroup name prefixes that are tracked even with `runtime_only` set.
    pub prefix_whitelist: Vec<String>,
    /// Track only the root and whitelisted cgroups, leaving the rest to runtime factories.
    pub runtime_only: bool,
    pub metrics: MetricSet,
}

/// Registers the raw factory. Register it after all runtime factories so they get
/// the first chance to claim a cgroup.
///
/// # Errors
///
/// Returns [`Error::NoCgroups`] if no cgroup hierarchy is mounted.
pub fn register(
    registry: &FactoryRegistry,
    collaborators: Collaborators,
    subsystems: CgroupSubsystems,
    options: RawOptions,
) -> Result<(), Error> {
    if subsystems.is_empty() {
        return Err(Error::NoCgroups);
    }

    log::info!(
        "registering raw factory (runtime only: {}, whitelist: {:?})",
        options.runtime_only,
        options.prefix_whitelist
    );
    let factory = RawFactory::new(collaborators, subsystems, options);
    registry.register(Arc::new(factory), &[WatchSource::Raw]);
    Ok(())
}
