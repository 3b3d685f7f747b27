use crate::error::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid metric kind: {0}")]
    InvalidMetricKind(String),
    #[error("could not find path for resource `{resource}` for container `{container}`")]
    CgroupPathNotFound { resource: String, container: String },
    #[error("no known factory can handle creation of container `{0}`")]
    NoFactory(String),
    #[error("container `{0}` is already owned by a handler")]
    AlreadyClaimed(String),
    #[error("factory `{factory}` failed to create a handler for container `{name}`: {source}")]
    Factory {
        factory: String,
        name: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Cgroup(#[from] crate::cgroup::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
