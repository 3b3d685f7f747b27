use std::path::PathBuf;

/// Errors that may occur while working out where the collector runs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to check if path `{path}` exists: {source}")]
    ExistenceCheck {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read namespace link `{path}`: {source}")]
    ReadNamespace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    FileOpen(#[from] crate::fsutil::FileOpenError),
    #[error("failed to read line for file `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("running in a container, but the host root is not mounted at `{0}`")]
    MissingHostRoot(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
