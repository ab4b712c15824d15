//! Shutdown signal handling

use tokio::signal;
use tracing::{info, warn};

/// Resolve on SIGTERM, SIGINT or Ctrl+C.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, falling back to Ctrl+C");
                signal::ctrl_c().await.ok();
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
    }
}
