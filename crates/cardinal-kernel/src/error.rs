//! Kernel error types

use std::path::PathBuf;

use crate::router::{HttpMethod, RouteGroupHandle};

/// A module's code could not be loaded or initialized.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("module directory not found: {0}")]
    NotFound(PathBuf),

    #[error("entry marker '{marker}' missing in {dir}")]
    MissingEntry { marker: String, dir: PathBuf },

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("syntax error in {file}: {message}")]
    Compile { file: String, message: String },

    #[error("initialization of {file} failed: {message}")]
    Init { file: String, message: String },

    #[error("invalid route declaration in {file}: {message}")]
    InvalidRoute { file: String, message: String },
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// The Router Surface rejected a registration change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RouterError {
    #[error("invalid route path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("route {method} {path} is already registered by {owner}")]
    Conflict {
        method: HttpMethod,
        path: String,
        owner: RouteGroupHandle,
    },

    #[error("route path '{path}' falls under reserved prefix '{prefix}'")]
    Reserved { path: String, prefix: String },

    #[error("unknown route group {0}")]
    UnknownGroup(RouteGroupHandle),
}
