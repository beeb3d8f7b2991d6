//! Error types for the change-detection pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
///
/// Only [`WatchSet::start`](super::WatchSet::start) and
/// [`Pipeline::start`](super::Pipeline::start) return these to the caller.
/// Everything after setup is logged and reflected in the status store instead.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Sync root {path} is unavailable: {source}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
