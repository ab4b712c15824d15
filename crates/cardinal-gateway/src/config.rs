//! Server configuration
//!
//! Sources, later ones winning: built-in defaults, an optional config file
//! (TOML, YAML or JSON), `CARDINAL_*` environment variables (`__` marks
//! nesting, e.g. `CARDINAL_WATCH__POLL_INTERVAL_MS`) and finally command-line
//! overrides. `.env` files are read by the binary before loading.

use std::path::PathBuf;
use std::time::Duration;

use cardinal_kernel::config::{ConfigError, ConfigResult, env_source, load_layered};
use cardinal_modules::{ScriptLimits, WatchConfig};
use config::Environment;
use serde::{Deserialize, Serialize};

use crate::router::DEFAULT_BODY_LIMIT;

/// Prefix of environment variables read by [`CardinalConfig::load`].
pub const ENV_PREFIX: &str = "CARDINAL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalConfig {
    pub app_name: String,
    pub description: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    /// Root directory scanned for modules
    pub modules_path: PathBuf,
    /// Run the change watcher
    pub auto_reload: bool,
    /// Prefix of the health and module admin endpoints
    pub admin_prefix: String,
    pub log_level: String,
    /// `text` or `json`
    pub log_format: String,
    pub log_file: Option<PathBuf>,
    /// Largest request body accepted by module routes
    pub max_body_bytes: usize,
    pub watch: WatchSettings,
    pub script: ScriptLimits,
}

impl Default for CardinalConfig {
    fn default() -> Self {
        Self {
            app_name: "Cardinal API".to_string(),
            description: "Modular HTTP API with hot-reloadable modules".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            modules_path: PathBuf::from("modules"),
            auto_reload: true,
            admin_prefix: "/api".to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            log_file: None,
            max_body_bytes: DEFAULT_BODY_LIMIT,
            watch: WatchSettings::default(),
            script: ScriptLimits::default(),
        }
    }
}

/// `[watch]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub extensions: Vec<String>,
    pub fs_events: bool,
    pub unload_removed: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            error_backoff_ms: 5000,
            extensions: vec!["rhai".to_string()],
            fs_events: false,
            unload_removed: false,
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub modules_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub no_reload: bool,
    pub verbose: bool,
}

impl CardinalConfig {
    /// Load from defaults, `path` and the process environment.
    pub fn load(path: Option<&str>) -> ConfigResult<Self> {
        Self::load_with_env(path, env_source(ENV_PREFIX))
    }

    /// Load from defaults, `path` and an explicit environment source.
    pub fn load_with_env(path: Option<&str>, env: Environment) -> ConfigResult<Self> {
        let config: Self = load_layered(&Self::default(), path, env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(ConfigError::Parse(format!(
                "log_format must be 'text' or 'json', got '{}'",
                self.log_format
            )));
        }
        if !self.admin_prefix.is_empty() && !self.admin_prefix.starts_with('/') {
            return Err(ConfigError::Parse(format!(
                "admin_prefix must start with '/', got '{}'",
                self.admin_prefix
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Parse(
                "max_body_bytes must be positive".to_string(),
            ));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::Parse(
                "watch.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.modules_path {
            self.modules_path = path.clone();
        }
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if overrides.no_reload {
            self.auto_reload = false;
        }
        if overrides.verbose {
            self.log_level = "debug".to_string();
        }
    }

    /// `admin_prefix` without a trailing slash; `""` mounts admin routes at the root.
    pub fn admin_prefix(&self) -> &str {
        self.admin_prefix.trim_end_matches('/')
    }

    /// Host paths module routes may not claim.
    pub fn reserved_prefixes(&self) -> Vec<String> {
        let mut reserved = vec!["/health".to_string()];
        let admin = self.admin_prefix();
        if admin.is_empty() {
            reserved.push("/modules".to_string());
        } else {
            reserved.push(admin.to_string());
        }
        reserved
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn watch_config(&self) -> WatchConfig {
        let mut watch = WatchConfig::default()
            .with_poll_interval(Duration::from_millis(self.watch.poll_interval_ms))
            .with_error_backoff(Duration::from_millis(self.watch.error_backoff_ms))
            .with_fs_events(self.watch.fs_events)
            .with_unload_removed(self.watch.unload_removed);
        watch.extensions = self.watch.extensions.clone();
        watch
    }

    pub fn script_limits(&self) -> ScriptLimits {
        self.script.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env_source(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = CardinalConfig::load_with_env(None, env_from(&[])).unwrap();
        assert_eq!(config.app_name, "Cardinal API");
        assert_eq!(config.port, 8000);
        assert_eq!(config.modules_path, PathBuf::from("modules"));
        assert!(config.auto_reload);
        assert_eq!(config.admin_prefix, "/api");
        assert_eq!(config.watch.poll_interval_ms, 2000);
        assert_eq!(config.log_file, None);
        assert_eq!(config.max_body_bytes, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn file_then_env_then_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardinal.toml");
        std::fs::write(
            &path,
            r#"
            port = 9000
            modules_path = "services"
            log_format = "json"

            [watch]
            poll_interval_ms = 500
            unload_removed = true

            [script]
            max_operations = 1000
            "#,
        )
        .unwrap();

        let mut config = CardinalConfig::load_with_env(
            path.to_str(),
            env_from(&[
                ("CARDINAL_PORT", "9100"),
                ("CARDINAL_WATCH__POLL_INTERVAL_MS", "250"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.modules_path, PathBuf::from("services"));
        assert_eq!(config.log_format, "json");
        assert_eq!(config.watch.poll_interval_ms, 250);
        assert!(config.watch.unload_removed);
        assert_eq!(config.script.max_operations, 1000);
        assert_eq!(config.script.max_call_levels, ScriptLimits::default().max_call_levels);

        config.apply_overrides(&ConfigOverrides {
            port: Some(9200),
            no_reload: true,
            verbose: true,
            ..Default::default()
        });
        assert_eq!(config.port, 9200);
        assert!(!config.auto_reload);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.watch_config().poll_interval, Duration::from_millis(250));
        assert!(config.watch_config().unload_removed);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = CardinalConfig::load_with_env(None, env_from(&[("CARDINAL_LOG_FORMAT", "xml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = CardinalConfig::load_with_env(None, env_from(&[("CARDINAL_MAX_BODY_BYTES", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reserved_prefixes_follow_admin_prefix() {
        let mut config = CardinalConfig::default();
        assert_eq!(config.reserved_prefixes(), vec!["/health", "/api"]);

        config.admin_prefix = "/admin/".to_string();
        assert_eq!(config.admin_prefix(), "/admin");
        assert_eq!(config.reserved_prefixes(), vec!["/health", "/admin"]);
    }
}
