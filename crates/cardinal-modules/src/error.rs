//! Module host errors

use std::path::PathBuf;

use cardinal_kernel::{LoadError, RouterError};

/// Errors from module discovery, lifecycle and watching.
#[derive(Debug, thiserror::Error)]
pub enum ModuleHostError {
    #[error("cannot list modules root {root}: {source}")]
    Discovery {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid module name '{0}'")]
    InvalidName(String),

    #[error("module '{name}' failed to load: {source}")]
    Load {
        name: String,
        #[source]
        source: LoadError,
    },

    #[error("routes of module '{name}' rejected by router: {source}")]
    RouterAttachment {
        name: String,
        #[source]
        source: RouterError,
    },

    #[error("module '{0}' is not loaded")]
    NotLoaded(String),

    #[error("module watcher is already running")]
    WatcherAlreadyRunning,

    #[error("module watcher setup failed: {0}")]
    WatcherSetup(String),

    #[error("module watcher tick failed: {0}")]
    WatcherTick(String),
}

impl ModuleHostError {
    /// Module name the error concerns, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            ModuleHostError::Load { name, .. }
            | ModuleHostError::RouterAttachment { name, .. }
            | ModuleHostError::NotLoaded(name)
            | ModuleHostError::InvalidName(name) => Some(name),
            _ => None,
        }
    }
}

pub type ModuleHostResult<T> = Result<T, ModuleHostError>;
