//! Axum-based HTTP host.
//!
//! [`CardinalServer`] builds the module host and wires it into a running axum
//! service: host endpoints are static routes; every other request falls
//! through to the [`DynamicRouter`] snapshot serving module routes.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `GET`    | `/health` | Liveness check |
//! | `GET`    | `{admin}/health` | Liveness check |
//! | `GET`    | `{admin}/modules` | Loaded modules |
//! | `GET`    | `{admin}/modules/{name}` | One module |
//! | `POST`   | `{admin}/modules/{name}/reload` | Load or reload a module |
//! | `DELETE` | `{admin}/modules/{name}` | Unload a module |
//! | `POST`   | `{admin}/modules/rescan` | Load every module under the root |
//! | `*`      | anything else | Module routes |

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    response::Response,
};
use cardinal_kernel::{ModuleSource, RouterSurface};
use cardinal_modules::{LoadReport, ModuleManager, ScriptModuleSource};
use tracing::{info, warn};

use crate::config::CardinalConfig;
use crate::error::{ServerError, ServerResult};
use crate::handlers::{health_router, modules_router};
use crate::router::DynamicRouter;
use crate::state::AppState;

/// Build the axum app around `state`.
pub fn build_app(state: AppState) -> Router {
    let admin_prefix = state.config.admin_prefix().to_string();
    Router::new()
        .merge(health_router(&admin_prefix))
        .merge(modules_router(&admin_prefix))
        .fallback(dispatch_module_route)
        .with_state(Arc::new(state))
}

async fn dispatch_module_route(State(state): State<Arc<AppState>>, request: Request) -> Response {
    state.router.dispatch(request).await
}

/// The module host and its HTTP surface.
pub struct CardinalServer {
    config: Arc<CardinalConfig>,
    router: Arc<DynamicRouter>,
    manager: Arc<ModuleManager>,
}

impl CardinalServer {
    /// Create the router and lifecycle manager. The modules root is created if
    /// it is missing; nothing is loaded yet.
    pub fn new(config: CardinalConfig) -> ServerResult<Self> {
        let source: Arc<dyn ModuleSource> =
            Arc::new(ScriptModuleSource::new(config.script_limits()));
        Self::with_source(config, source)
    }

    /// Like [`new`](Self::new) with a custom code-loading capability.
    pub fn with_source(
        config: CardinalConfig,
        source: Arc<dyn ModuleSource>,
    ) -> ServerResult<Self> {
        let router = Arc::new(
            DynamicRouter::new(config.reserved_prefixes()).with_body_limit(config.max_body_bytes),
        );
        let surface: Arc<dyn RouterSurface> = router.clone();
        let manager = ModuleManager::new(&config.modules_path, source, surface)?;
        Ok(Self {
            config: Arc::new(config),
            router,
            manager,
        })
    }

    pub fn config(&self) -> &CardinalConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    pub fn router(&self) -> &Arc<DynamicRouter> {
        &self.router
    }

    pub fn app(&self) -> Router {
        build_app(AppState::new(
            self.manager.clone(),
            self.router.clone(),
            self.config.clone(),
        ))
    }

    /// Load every module, then start the watcher when `auto_reload` is set.
    pub async fn start_modules(&self) -> ServerResult<LoadReport> {
        let report = self.manager.load_all().await?;
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            root = %self.manager.root().display(),
            "Initial module load finished"
        );
        for failure in &report.failed {
            warn!(
                module = %failure.name,
                error = %failure.error,
                "Module failed to load at startup"
            );
        }

        if self.config.auto_reload {
            self.manager.start_watcher(self.config.watch_config()).await?;
        }
        Ok(report)
    }

    /// Bind and serve until `shutdown` resolves, then stop the watcher.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(
            addr = %addr,
            app = %self.config.app_name,
            version = %self.config.version,
            "Cardinal listening"
        );

        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;

        if self.manager.stop_watcher().await {
            info!("Module watcher stopped");
        }
        info!("Cardinal stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(modules_path: std::path::PathBuf) -> CardinalConfig {
        CardinalConfig {
            modules_path,
            auto_reload: false,
            host: "127.0.0.1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn unusable_modules_root_is_a_module_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "").unwrap();

        let err = CardinalServer::new(config_for(file)).err().unwrap();
        assert!(matches!(err, ServerError::Modules(_)));
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() {
        let dir = tempfile::tempdir().unwrap();
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut config = config_for(dir.path().join("modules"));
        config.port = taken.local_addr().unwrap().port();
        let server = CardinalServer::new(config).unwrap();

        let err = server.serve(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
