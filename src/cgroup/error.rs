use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid pid `{value}` at line {line} of `{path}`")]
    InvalidPid {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("no cgroup subsystems found in `{path}`")]
    MissingSubsystems { path: PathBuf },
    #[error(transparent)]
    Mountinfo(#[from] crate::mountinfo::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
