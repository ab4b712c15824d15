//! Gateway error types

use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cardinal_kernel::LoadError;
use cardinal_modules::ModuleHostError;
use serde_json::json;
use thiserror::Error;

/// Gateway-level errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("module '{name}' could not be loaded: {message}")]
    ModuleLoadFailed { name: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ModuleHostError> for GatewayError {
    fn from(err: ModuleHostError) -> Self {
        match err {
            ModuleHostError::NotLoaded(name) => GatewayError::ModuleNotFound(name),
            ModuleHostError::Load {
                name,
                source: LoadError::NotFound(_),
            } => GatewayError::ModuleNotFound(name),
            ModuleHostError::InvalidName(name) => {
                GatewayError::InvalidRequest(format!("invalid module name '{name}'"))
            }
            err @ (ModuleHostError::Load { .. } | ModuleHostError::RouterAttachment { .. }) => {
                GatewayError::ModuleLoadFailed {
                    name: err.module().unwrap_or_default().to_string(),
                    message: err.to_string(),
                }
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GatewayError::ModuleNotFound(name) => (
                StatusCode::NOT_FOUND,
                "MODULE_NOT_FOUND",
                format!("module '{}' not found", name),
            ),
            GatewayError::ModuleLoadFailed { message, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "MODULE_LOAD_FAILED",
                message.clone(),
            ),
            GatewayError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            GatewayError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures setting up or running the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Modules(#[from] ModuleHostError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server terminated: {0}")]
    Serve(#[source] std::io::Error),

    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("installing tracing subscriber: {0}")]
    Subscriber(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
