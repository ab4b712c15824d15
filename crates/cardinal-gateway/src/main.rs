//! Cardinal - entry point.
//!
//! Loads configuration, discovers and loads the modules under
//! `modules_path`, watches them for changes and serves their routes.
//!
//! # Environment variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `CARDINAL_CONFIG` | Configuration file (same as `--config`) |
//! | `CARDINAL_<KEY>` | Overrides a top-level key, e.g. `CARDINAL_PORT=9000` |
//! | `CARDINAL_<TABLE>__<KEY>` | Overrides a nested key, e.g. `CARDINAL_WATCH__FS_EVENTS=true` |
//! | `RUST_LOG` | Log filter, takes precedence over `log_level` |

use std::path::PathBuf;

use anyhow::Context;
use cardinal_gateway::{
    CardinalConfig, CardinalServer, ConfigOverrides, logging, signal::shutdown_signal,
};
use clap::Parser;
use tracing::info;

/// Cardinal - modular HTTP API with hot-reloadable modules
#[derive(Parser)]
#[command(name = "cardinal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (toml, yaml or json)
    #[arg(short = 'c', long, env = "CARDINAL_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory of the module tree
    #[arg(short = 'm', long)]
    modules_path: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable the module change watcher
    #[arg(long)]
    no_reload: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            modules_path: self.modules_path.clone(),
            host: self.host.clone(),
            port: self.port,
            no_reload: self.no_reload,
            verbose: self.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(|p| p.to_str().context("config path is not valid UTF-8"))
        .transpose()?;
    let mut config = CardinalConfig::load(config_path).context("loading configuration")?;
    config.apply_overrides(&cli.overrides());

    logging::init(&config).context("initializing logging")?;
    info!(
        app = %config.app_name,
        modules_path = %config.modules_path.display(),
        auto_reload = config.auto_reload,
        "Starting Cardinal"
    );

    let server = CardinalServer::new(config).context("creating module host")?;
    server.start_modules().await.context("loading modules")?;
    server.serve(shutdown_signal()).await?;
    Ok(())
}
