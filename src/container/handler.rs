use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::info::{ContainerReference, ContainerSpec, ContainerStats};

use super::Result;

/// Runtime that owns a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerType {
    Raw,
    Docker,
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerType::Raw => f.write_str("raw"),
            ContainerType::Docker => f.write_str("docker"),
        }
    }
}

/// How far below a container to look when listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    SelfOnly,
    Recursive,
}

/// Runtime-agnostic view of one container.
///
/// Handlers are shared between the discovery loop and the stats poller, so every
/// method takes `&self`. [`ContainerHandler::start`] and [`ContainerHandler::cleanup`]
/// must be idempotent.
pub trait ContainerHandler: Send + Sync {
    fn container_reference(&self) -> ContainerReference;

    /// Builds the container's spec from live state.
    fn spec(&self) -> Result<ContainerSpec>;

    /// Takes a fresh stats sample.
    fn stats(&self) -> Result<ContainerStats>;

    /// Lists the containers nested below this one.
    fn list_containers(&self, list_type: ListType) -> Result<Vec<ContainerReference>>;

    /// Returns the absolute cgroup path for the given subsystem.
    ///
    /// # Errors
    ///
    /// Returns [`super::Error::CgroupPathNotFound`] if the subsystem is not mounted.
    fn cgroup_path(&self, resource: &str) -> Result<&Path>;

    fn container_labels(&self) -> &HashMap<String, String>;

    fn container_ip_address(&self) -> &str;

    fn list_processes(&self, list_type: ListType) -> Result<Vec<u32>>;

    /// Whether every cgroup of the container still exists.
    fn exists(&self) -> bool;

    fn container_type(&self) -> ContainerType;

    /// Starts background work (filesystem sampling), if any.
    fn start(&self);

    /// Stops background work. Safe to call more than once.
    fn cleanup(&self);
}
