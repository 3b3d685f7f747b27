//! Minimal client of the Docker Engine API over its unix socket.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;

use crate::container::BoxFuture;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to docker at `{path}`: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("http error talking to docker: {0}")]
    Http(#[from] hyper::Error),
    #[error("failed to build request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("docker returned {status} for `{path}`: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },
    #[error("failed to decode docker response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cannot parse docker version `{0}`")]
    InvalidVersion(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The parts of `GET /containers/{id}/json` the collector uses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerJson {
    pub id: String,
    pub name: String,
    /// RFC 3339 timestamp with nanoseconds.
    pub created: String,
    pub restart_count: u64,
    pub state: ContainerState,
    pub config: ContainerConfig,
    pub host_config: HostConfig,
    pub network_settings: NetworkSettings,
    pub graph_driver: GraphDriver,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerState {
    pub running: bool,
    pub pid: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfig {
    pub image: String,
    pub labels: Option<HashMap<String, String>>,
    pub env: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostConfig {
    pub network_mode: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GraphDriver {
    pub name: String,
    pub data: Option<HashMap<String, String>>,
}

/// The parts of `GET /info` the collector uses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DockerInfo {
    pub driver: String,
    /// Key/value pairs describing the storage driver, e.g. `["Pool Name", "docker-pool"]`.
    pub driver_status: Option<Vec<(String, String)>>,
    pub docker_root_dir: String,
}

impl DockerInfo {
    pub fn driver_status(&self, key: &str) -> Option<&str> {
        self.driver_status
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DockerVersion {
    pub version: String,
    pub api_version: String,
}

/// Parses the leading `major.minor.patch` of a Docker version such as `20.10.7+dfsg1`.
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] if fewer than three numeric components lead the string.
pub fn parse_version(version: &str) -> Result<[u64; 3]> {
    let invalid = || Error::InvalidVersion(version.to_owned());
    let mut parts = version.splitn(3, '.');
    let mut next = |last: bool| -> Result<u64> {
        let part = parts.next().ok_or_else(invalid)?;
        let digits = if last {
            let end = part
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(part.len());
            &part[..end]
        } else {
            part
        };
        digits.parse().map_err(|_| invalid())
    };
    Ok([next(false)?, next(false)?, next(true)?])
}

/// Operations of the Docker daemon the collector depends on.
pub trait DockerApi: Send + Sync {
    fn inspect_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<ContainerJson>>;

    fn info(&self) -> BoxFuture<'_, Result<DockerInfo>>;

    fn version(&self) -> BoxFuture<'_, Result<DockerVersion>>;
}

/// HTTP/1.1 client that opens one connection per request.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket_path: PathBuf,
}

impl DockerClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| Error::Connect {
                path: self.socket_path.clone(),
                source,
            })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                log::debug!("docker connection closed: {err}");
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("http://localhost{path}"))
            .header("Host", "localhost")
            .body(Empty::<Bytes>::new())?;
        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        if !status.is_success() {
            return Err(Error::Status {
                path: path.to_owned(),
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).trim().to_owned(),
            });
        }
        log::trace!("GET {path} -> {status}");
        Ok(serde_json::from_slice(&body)?)
    }
}

impl DockerApi for DockerClient {
    fn inspect_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<ContainerJson>> {
        Box::pin(async move { self.get(&format!("/containers/{id}/json")).await })
    }

    fn info(&self) -> BoxFuture<'_, Result<DockerInfo>> {
        Box::pin(self.get("/info"))
    }

    fn version(&self) -> BoxFuture<'_, Result<DockerVersion>> {
        Box::pin(self.get("/version"))
    }
}
