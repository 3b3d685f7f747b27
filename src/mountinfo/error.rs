use std::path::PathBuf;

use super::parser::ParseError;
use crate::fsutil;

/// Errors from reading a mountinfo file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A line that is not a valid mountinfo entry. `line` is 1-based.
    #[error("invalid mount entry at `{path}`:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: ParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
