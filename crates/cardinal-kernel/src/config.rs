//! Layered configuration loading
//!
//! Sources are applied in order, later ones winning:
//! built-in defaults → optional config file → prefixed environment variables.
//!
//! ## Features
//!
//! - Auto-detection of format from file extension (YAML, TOML, JSON)
//! - `${VAR}` environment variable substitution inside config files
//! - `PREFIX_SECTION__KEY` environment overrides (`__` marks nesting)

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detect configuration format from file extension
///
/// - YAML: `.yaml`, `.yml`
/// - TOML: `.toml`
/// - JSON: `.json`
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Replace `${VAR_NAME}` references with the variable's value.
///
/// Unset variables are left as written.
pub fn substitute_env_vars(content: &str) -> ConfigResult<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned())
}

/// Parse configuration from a string with an explicit format.
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content)?;
    Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a file, detecting its format from the extension.
pub fn load_config<T>(path: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

/// Environment source reading `PREFIX_KEY` and `PREFIX_SECTION__KEY` variables.
pub fn env_source(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Load `T` from `defaults`, then an optional file, then `env`.
///
/// Missing keys in the file or environment keep their default values.
pub fn load_layered<T>(defaults: &T, path: Option<&str>, env: Environment) -> ConfigResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let base = Cfg::try_from(defaults).map_err(|e| ConfigError::Serialization(e.to_string()))?;
    let mut builder = Cfg::builder().add_source(base);

    if let Some(path) = path {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content)?;
        builder = builder.add_source(File::from_str(&substituted, format));
    }

    builder
        .add_source(env)
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}
