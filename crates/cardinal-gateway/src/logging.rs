//! Logging setup
//!
//! `RUST_LOG` takes precedence over the configured `log_level`. Events go to
//! stdout in `text` or `json` format and, when `log_file` is set, to that file
//! as well (its directory is created on demand).

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CardinalConfig;
use crate::error::{ServerError, ServerResult};

/// Filter from `RUST_LOG`, falling back to `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(level),
    }
}

fn open_log_file(path: &Path) -> ServerResult<File> {
    let log_file_error = |source| ServerError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(log_file_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_file_error)
}

/// Install the global subscriber.
pub fn init(config: &CardinalConfig) -> ServerResult<()> {
    let json = config.log_format == "json";
    let ansi = std::env::var("NO_COLOR").is_err();

    let stdout = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(ansi).boxed()
    };

    let file = match &config.log_file {
        Some(path) => {
            let writer = Mutex::new(open_log_file(path)?);
            Some(if json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer().with_ansi(false).with_writer(writer).boxed()
            })
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout)
        .with(file)
        .with(env_filter(&config.log_level))
        .try_init()
        .map_err(|e| ServerError::Subscriber(e.to_string()))
}
