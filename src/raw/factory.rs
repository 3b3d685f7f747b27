use std::collections::HashMap;
use std::fmt;

use crate::cgroup::CgroupSubsystems;
use crate::container::{BoxFuture, Collaborators, ContainerHandler, ContainerHandlerFactory};
use crate::error::BoxError;

use super::{RawContainerHandler, RawOptions};

pub struct RawFactory {
    collaborators: Collaborators,
    subsystems: CgroupSubsystems,
    options: RawOptions,
}

impl RawFactory {
    pub fn new(collaborators: Collaborators, subsystems: CgroupSubsystems, options: RawOptions) -> Self {
        Self {
            collaborators,
            subsystems,
            options,
        }
    }
}

impl fmt::Display for RawFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("raw")
    }
}

impl ContainerHandlerFactory for RawFactory {
    /// Handles every cgroup. Accepts the root, whitelisted prefixes, and everything
    /// else unless restricted to runtime containers.
    fn can_handle_and_accept(&self, name: &str) -> Result<(bool, bool), BoxError> {
        if name == "/" {
            return Ok((true, true));
        }
        let whitelisted = self
            .options
            .prefix_whitelist
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()));
        Ok((true, whitelisted || !self.options.runtime_only))
    }

    fn new_container_handler<'a>(
        &'a self,
        name: &'a str,
        _in_host_namespace: bool,
    ) -> BoxFuture<'a, Result<Box<dyn ContainerHandler>, BoxError>> {
        Box::pin(async move {
            let handler = RawContainerHandler::new(
                name,
                self.subsystems.clone(),
                self.collaborators.clone(),
                self.options.metrics.clone(),
            );
            Ok(Box::new(handler) as Box<dyn ContainerHandler>)
        })
    }

    fn debug_info(&self) -> HashMap<String, Vec<String>> {
        let mut mounts: Vec<String> = self
            .subsystems
            .mount_points()
            .iter()
            .map(|(subsystem, path)| format!("{subsystem}: {}", path.display()))
            .collect();
        mounts.sort();
        HashMap::from([
            ("Cgroup mounts".to_owned(), mounts),
            (
                "Raw prefix whitelist".to_owned(),
                self.options.prefix_whitelist.clone(),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerType, MetricSet};
    use crate::docker::testing::collaborators;
    use std::path::PathBuf;

    fn factory(runtime_only: bool, prefix_whitelist: Vec<String>) -> RawFactory {
        RawFactory::new(
            collaborators(),
            CgroupSubsystems::new(HashMap::from([(
                "cpu".to_owned(),
                PathBuf::from("/sys/fs/cgroup"),
            )])),
            RawOptions {
                prefix_whitelist,
                runtime_only,
                metrics: MetricSet::all(),
            },
        )
    }

    #[test]
    fn test_runtime_only_accepts_root_alone() {
        let factory = factory(true, Vec::new());
        assert_eq!(factory.can_handle_and_accept("/").unwrap(), (true, true));
        assert_eq!(factory.can_handle_and_accept("/other").unwrap(), (true, false));
    }

    #[test]
    fn test_whitelist_prefixes() {
        let factory = factory(true, vec![String::new(), "/system.slice".to_owned()]);
        assert_eq!(
            factory.can_handle_and_accept("/system.slice/sshd.service").unwrap(),
            (true, true)
        );
        assert_eq!(factory.can_handle_and_accept("/user.slice").unwrap(), (true, false));
    }

    #[test]
    fn test_accepts_everything_without_runtime_only() {
        let factory = factory(false, Vec::new());
        assert_eq!(factory.can_handle_and_accept("/anything").unwrap(), (true, true));
    }

    #[tokio::test]
    async fn test_builds_raw_handler() {
        let factory = factory(false, Vec::new());
        let handler = factory.new_container_handler("/user.slice", true).await.unwrap();
        assert_eq!(handler.container_type(), ContainerType::Raw);
        assert_eq!(handler.container_reference().name, "/user.slice");
        assert_eq!(
            factory.debug_info()["Cgroup mounts"],
            vec!["cpu: /sys/fs/cgroup".to_owned()]
        );
    }
}
