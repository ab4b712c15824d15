//! Shared application state for the HTTP host

use std::sync::Arc;

use cardinal_modules::ModuleManager;

use crate::config::CardinalConfig;
use crate::router::DynamicRouter;

/// State shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle manager - source of truth for loaded modules
    pub manager: Arc<ModuleManager>,
    /// Routing table module route groups are attached to
    pub router: Arc<DynamicRouter>,
    pub config: Arc<CardinalConfig>,
}

impl AppState {
    pub fn new(
        manager: Arc<ModuleManager>,
        router: Arc<DynamicRouter>,
        config: Arc<CardinalConfig>,
    ) -> Self {
        Self {
            manager,
            router,
            config,
        }
    }
}
