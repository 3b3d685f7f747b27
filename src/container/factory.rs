use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;

use crate::error::BoxError;

use super::ContainerHandler;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Discovery source a factory listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchSource {
    /// Cgroup hierarchy watching.
    Raw,
    /// Events of the Docker daemon.
    Docker,
}

/// Creates handlers for the containers of one runtime.
///
/// The [`fmt::Display`] implementation is the factory's identifier.
pub trait ContainerHandlerFactory: fmt::Display + Send + Sync {
    /// Reports whether this factory can handle `name` and whether it wants to.
    ///
    /// Must not have side effects.
    fn can_handle_and_accept(&self, name: &str) -> Result<(bool, bool), BoxError>;

    /// Builds a handler for `name`. May perform expensive I/O.
    fn new_container_handler<'a>(
        &'a self,
        name: &'a str,
        in_host_namespace: bool,
    ) -> BoxFuture<'a, Result<Box<dyn ContainerHandler>, BoxError>>;

    fn debug_info(&self) -> HashMap<String, Vec<String>>;
}
