//! The runtime-agnostic container handler contract and the factory registry.
//!
//! A [`ContainerHandlerFactory`] is registered per runtime with the
//! [`FactoryRegistry`]. For every discovered cgroup name the registry picks the first
//! factory that can handle it and asks it for a [`ContainerHandler`].

use std::sync::Arc;

mod error;
mod factory;
mod handler;
mod metrics;
mod registry;

pub use error::{Error, Result};
pub use factory::{BoxFuture, ContainerHandlerFactory, WatchSource};
pub use handler::{ContainerHandler, ContainerType, ListType};
pub use metrics::{MetricKind, MetricSet};
pub use registry::FactoryRegistry;

use crate::cgroup::CgroupCollector;
use crate::cpuload::LoadReader;
use crate::fs::FsInfo;
use crate::machine::MachineInfoProvider;

/// External components every runtime factory hands to its handlers.
#[derive(Clone)]
pub struct Collaborators {
    pub machine: Arc<dyn MachineInfoProvider>,
    pub fs_info: Arc<dyn FsInfo>,
    pub cgroups: Arc<dyn CgroupCollector>,
    /// Taskstats reader; `None` disables CPU load collection.
    pub load_reader: Option<Arc<dyn LoadReader>>,
}
