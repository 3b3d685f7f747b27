use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashSet;

use super::{ContainerHandler, ContainerHandlerFactory, Error, Result, WatchSource};

/// Resolves container names to the runtime factory that owns them.
///
/// Factories are consulted in registration order; the first one that can handle a
/// name decides whether it is accepted. Accepted names are claimed so that no second
/// handler is built for the same container until [`FactoryRegistry::release`] is called.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: RwLock<HashMap<WatchSource, Vec<Arc<dyn ContainerHandlerFactory>>>>,
    claimed: DashSet<String>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `factory` to the factories of every given source.
    pub fn register(&self, factory: Arc<dyn ContainerHandlerFactory>, sources: &[WatchSource]) {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        for source in sources {
            factories
                .entry(*source)
                .or_default()
                .push(Arc::clone(&factory));
        }
    }

    pub fn has_factories(&self) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|f| !f.is_empty())
    }

    /// Removes all factories. Claimed names are kept.
    pub fn clear(&self) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn factories_for(&self, source: WatchSource) -> Vec<Arc<dyn ContainerHandlerFactory>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source)
            .cloned()
            .unwrap_or_default()
    }

    /// Builds a handler for `name` with the first factory of `source` that can handle it.
    ///
    /// Returns `Ok(None)` if that factory does not accept the container. A factory
    /// that fails to build the handler gives up the name, and the scan continues with
    /// the next factory.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyClaimed`] if another handler owns `name`.
    /// - [`Error::Factory`] if a factory failed to build the handler and no later
    ///   factory can handle `name`.
    /// - [`Error::NoFactory`] if no registered factory can handle `name`.
    pub async fn new_container_handler(
        &self,
        name: &str,
        source: WatchSource,
        in_host_namespace: bool,
    ) -> Result<Option<Box<dyn ContainerHandler>>> {
        let mut failure = None;
        for factory in self.factories_for(source) {
            let (can_handle, can_accept) = match factory.can_handle_and_accept(name) {
                Ok(answer) => answer,
                Err(err) => {
                    log::debug!(
                        "error trying to work out if factory `{}` can handle `{}`: {}",
                        factory,
                        name,
                        err
                    );
                    continue;
                }
            };
            if !can_handle {
                log::trace!("factory `{}` cannot handle container `{}`", factory, name);
                continue;
            }
            if !can_accept {
                log::debug!(
                    "factory `{}` can handle container `{}`, but ignoring",
                    factory,
                    name
                );
                return Ok(None);
            }
            if !self.claimed.insert(name.to_owned()) {
                return Err(Error::AlreadyClaimed(name.to_owned()));
            }

            log::debug!("using factory `{}` for container `{}`", factory, name);
            match factory.new_container_handler(name, in_host_namespace).await {
                Ok(handler) => return Ok(Some(handler)),
                Err(source) => {
                    self.claimed.remove(name);
                    log::debug!(
                        "factory `{}` failed to create a handler for `{}`: {}",
                        factory,
                        name,
                        source
                    );
                    failure = Some(Error::Factory {
                        factory: factory.to_string(),
                        name: name.to_owned(),
                        source,
                    });
                }
            }
        }

        Err(failure.unwrap_or_else(|| Error::NoFactory(name.to_owned())))
    }

    /// Gives up ownership of `name`. Returns whether it was claimed.
    pub fn release(&self, name: &str) -> bool {
        self.claimed.remove(name).is_some()
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.claimed.contains(name)
    }

    /// Debug information of every registered factory, keyed by factory identifier.
    pub fn debug_info(&self) -> HashMap<String, HashMap<String, Vec<String>>> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories
            .values()
            .flatten()
            .map(|factory| (factory.to_string(), factory.debug_info()))
            .collect()
    }
}
