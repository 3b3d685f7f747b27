//! Environment detection.
//!
//! Decides whether the collector runs on the host or inside a container, which
//! determines where host paths are found and whether handlers run in the host's
//! namespaces.
mod checks;
mod detect;
mod error;

pub use detect::{RuntimeEnvironment, detect_runtime_environment};
pub use error::{Error, Result};
