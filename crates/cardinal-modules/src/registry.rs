//! Live module registry
//!
//! One entry per loaded module. Entries are replaced whole on reload, never
//! merged, and removed on unload.

use std::collections::HashMap;
use std::sync::Arc;

use cardinal_kernel::RouteGroupHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// A successfully loaded module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedModule {
    pub name: String,
    /// Route group handle, `None` when the module exposes no routes.
    pub route_group: Option<RouteGroupHandle>,
    /// Prefix the route group was registered under.
    pub prefix: Option<String>,
    pub route_count: usize,
    pub description: Option<String>,
    pub loaded_at: DateTime<Utc>,
    /// Successful reloads since the first load.
    pub reload_count: u32,
}

/// Registry of live modules, owned by the lifecycle manager.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Arc<RwLock<HashMap<String, LoadedModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `module.name`, returning the previous one.
    pub async fn insert(&self, module: LoadedModule) -> Option<LoadedModule> {
        debug!(module = %module.name, "Registry insert");
        self.modules
            .write()
            .await
            .insert(module.name.clone(), module)
    }

    pub async fn remove(&self, name: &str) -> Option<LoadedModule> {
        debug!(module = %name, "Registry remove");
        self.modules.write().await.remove(name)
    }

    pub async fn get(&self, name: &str) -> Option<LoadedModule> {
        self.modules.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.modules.read().await.contains_key(name)
    }

    /// All entries sorted by name.
    pub async fn list(&self) -> Vec<LoadedModule> {
        let mut modules: Vec<_> = self.modules.read().await.values().cloned().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    pub async fn names(&self) -> Vec<String> {
        self.list().await.into_iter().map(|m| m.name).collect()
    }

    pub async fn len(&self) -> usize {
        self.modules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.modules.read().await.is_empty()
    }
}
