use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::container::{BoxFuture, Collaborators, ContainerHandler, ContainerHandlerFactory};
use crate::error::BoxError;

use super::{DockerApi, DockerContainerHandler, DockerSettings, layer};

/// Builds handlers for cgroups that belong to Docker containers.
pub struct DockerFactory {
    client: Arc<dyn DockerApi>,
    collaborators: Collaborators,
    settings: DockerSettings,
}

impl DockerFactory {
    pub fn new(client: Arc<dyn DockerApi>, collaborators: Collaborators, settings: DockerSettings) -> Self {
        Self {
            client,
            collaborators,
            settings,
        }
    }
}

impl fmt::Display for DockerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(super::DOCKER_NAMESPACE)
    }
}

impl ContainerHandlerFactory for DockerFactory {
    fn can_handle_and_accept(&self, name: &str) -> Result<(bool, bool), BoxError> {
        let is_docker = layer::is_container_name(name);
        Ok((is_docker, is_docker))
    }

    fn new_container_handler<'a>(
        &'a self,
        name: &'a str,
        in_host_namespace: bool,
    ) -> BoxFuture<'a, Result<Box<dyn ContainerHandler>, BoxError>> {
        Box::pin(async move {
            let handler = DockerContainerHandler::new(
                name,
                self.client.as_ref(),
                &self.settings,
                self.collaborators.clone(),
                in_host_namespace,
            )
            .await?;
            Ok(Box::new(handler) as Box<dyn ContainerHandler>)
        })
    }

    fn debug_info(&self) -> HashMap<String, Vec<String>> {
        let [major, minor, patch] = self.settings.version;
        HashMap::from([
            (
                "Docker version".to_owned(),
                vec![format!("{major}.{minor}.{patch}")],
            ),
            (
                "Storage driver".to_owned(),
                vec![self.settings.driver.to_string()],
            ),
            (
                "Storage dir".to_owned(),
                vec![self.settings.storage_dir.display().to_string()],
            ),
            (
                "Thin pool".to_owned(),
                vec![self.settings.thin_pool_name.clone()],
            ),
        ])
    }
}
