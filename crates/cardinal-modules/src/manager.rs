//! Module lifecycle manager
//!
//! Loads module code through a [`ModuleSource`], resolves its route group,
//! attaches it to the [`RouterSurface`] and tracks the result in the
//! [`ModuleRegistry`]. Every registry read-modify-write together with its
//! router mutation runs under one async operation lock, so manual reloads
//! and watcher-driven reloads are serialized.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cardinal_kernel::{
    ModuleSource, RouteGroupHandle, RouterError, RouterSurface, path_belongs_to_prefix,
    resolve_route_group,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use crate::discovery::{discover, is_valid_module_name};
use crate::error::{ModuleHostError, ModuleHostResult};
use crate::registry::{LoadedModule, ModuleRegistry};
use crate::watcher::{ModuleWatcher, WatchConfig, WatcherHandle};

/// Lifecycle notifications broadcast by [`ModuleManager`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModuleEvent {
    Loaded { name: String, routes: usize },
    Reloaded { name: String, routes: usize },
    LoadFailed { name: String, error: String },
    Unloaded { name: String },
}

/// A module that failed during [`ModuleManager::load_all`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadFailure {
    pub name: String,
    pub error: String,
}

/// Per-module outcome of [`ModuleManager::load_all`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<LoadFailure>,
}

/// Read-only view of a loaded module, cross-referenced with the router.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub prefix: Option<String>,
    pub route_count: usize,
    /// `"METHOD /path"` for every registered route of the module.
    pub routes: Vec<String>,
    pub description: Option<String>,
    /// False when the module's route group is no longer present in the router.
    pub active: bool,
    pub loaded_at: DateTime<Utc>,
    pub reload_count: u32,
    pub last_error: Option<String>,
}

/// Owns the live registry and drives load, reload and unload.
pub struct ModuleManager {
    root: PathBuf,
    source: Arc<dyn ModuleSource>,
    router: Arc<dyn RouterSurface>,
    registry: ModuleRegistry,
    op_lock: Mutex<()>,
    last_errors: RwLock<HashMap<String, String>>,
    event_tx: broadcast::Sender<ModuleEvent>,
    watcher: Mutex<Option<WatcherHandle>>,
}

impl ModuleManager {
    /// Create a manager over `root`, creating the directory if it is missing.
    pub fn new(
        root: impl Into<PathBuf>,
        source: Arc<dyn ModuleSource>,
        router: Arc<dyn RouterSurface>,
    ) -> ModuleHostResult<Arc<Self>> {
        let root = root.into();
        if !root.exists() {
            info!(root = %root.display(), "Creating modules directory");
        }
        std::fs::create_dir_all(&root).map_err(|source| ModuleHostError::Discovery {
            root: root.clone(),
            source,
        })?;

        let (event_tx, _) = broadcast::channel(256);
        Ok(Arc::new(Self {
            root,
            source,
            router,
            registry: ModuleRegistry::new(),
            op_lock: Mutex::new(()),
            last_errors: RwLock::new(HashMap::new()),
            event_tx,
            watcher: Mutex::new(None),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn router(&self) -> &Arc<dyn RouterSurface> {
        &self.router
    }

    pub fn entry_marker(&self) -> &str {
        self.source.entry_marker()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
        self.event_tx.subscribe()
    }

    /// Names of the modules currently on disk.
    pub fn discover(&self) -> ModuleHostResult<Vec<String>> {
        discover(&self.root, self.source.entry_marker())
    }

    /// Load `name`, or reload it if it is already loaded.
    ///
    /// On reload the previous route group stays registered until the new code
    /// has loaded and resolved, then is swapped out in one router operation.
    /// Any failure leaves the registry and the router as they were.
    pub async fn load(&self, name: &str) -> ModuleHostResult<LoadedModule> {
        if !is_valid_module_name(name) {
            return Err(ModuleHostError::InvalidName(name.to_string()));
        }
        let _guard = self.op_lock.lock().await;
        self.load_locked(name).await
    }

    async fn load_locked(&self, name: &str) -> ModuleHostResult<LoadedModule> {
        let dir = self.root.join(name);
        let previous = self.registry.get(name).await;

        if previous.is_some() {
            debug!(module = %name, "Evicting cached module artifacts before reload");
            self.source.evict(name);
        }

        let code = match self.source.load(name, &dir).await {
            Ok(code) => code,
            Err(e) => {
                error!(module = %name, error = %e, "Failed to load module");
                let err = ModuleHostError::Load {
                    name: name.to_string(),
                    source: e,
                };
                self.record_failure(name, &err);
                return Err(err);
            }
        };

        let resolved = resolve_route_group(code.as_ref());
        match &resolved {
            Some(r) => debug!(module = %name, origin = %r.origin, "Resolved route group"),
            None => warn!(module = %name, "Module exposes no route group, loading without routes"),
        }
        let group = resolved.as_ref().map(|r| &r.group);
        let old_handle = previous.as_ref().and_then(|m| m.route_group);

        let attached = match (old_handle, group) {
            (Some(old), Some(group)) => self.router.replace_group(old, group).map(Some),
            (None, Some(group)) => self.router.register_group(group).map(Some),
            (Some(old), None) => match self.router.unregister(old) {
                Ok(()) | Err(RouterError::UnknownGroup(_)) => Ok(None),
                Err(e) => Err(e),
            },
            (None, None) => Ok(None),
        };

        let route_group = match attached {
            Ok(handle) => handle,
            Err(e) => {
                error!(module = %name, error = %e, "Router rejected module routes");
                self.source.evict(name);
                let err = ModuleHostError::RouterAttachment {
                    name: name.to_string(),
                    source: e,
                };
                self.record_failure(name, &err);
                return Err(err);
            }
        };

        let module = LoadedModule {
            name: name.to_string(),
            route_group,
            prefix: group.map(|g| g.prefix.clone()),
            route_count: group.map_or(0, |g| g.len()),
            description: code.description(),
            loaded_at: Utc::now(),
            reload_count: previous.as_ref().map_or(0, |m| m.reload_count + 1),
        };
        self.registry.insert(module.clone()).await;
        self.last_errors.write().remove(name);

        let routes = module.route_count;
        let event = if previous.is_some() {
            info!(module = %name, routes, reload = module.reload_count, "Module reloaded");
            ModuleEvent::Reloaded {
                name: name.to_string(),
                routes,
            }
        } else {
            info!(module = %name, routes, prefix = ?module.prefix, "Module loaded");
            ModuleEvent::Loaded {
                name: name.to_string(),
                routes,
            }
        };
        let _ = self.event_tx.send(event);

        Ok(module)
    }

    fn record_failure(&self, name: &str, err: &ModuleHostError) {
        let message = err.to_string();
        self.last_errors
            .write()
            .insert(name.to_string(), message.clone());
        let _ = self.event_tx.send(ModuleEvent::LoadFailed {
            name: name.to_string(),
            error: message,
        });
    }

    /// Discover and load every module, continuing past individual failures.
    pub async fn load_all(&self) -> ModuleHostResult<LoadReport> {
        let names = self.discover()?;
        info!(root = %self.root.display(), count = names.len(), "Loading modules");

        let mut report = LoadReport::default();
        for name in names {
            match self.load(&name).await {
                Ok(_) => report.loaded.push(name),
                Err(e) => report.failed.push(LoadFailure {
                    name,
                    error: e.to_string(),
                }),
            }
        }

        if !report.failed.is_empty() {
            warn!(
                loaded = report.loaded.len(),
                failed = report.failed.len(),
                "Some modules failed to load"
            );
        }
        Ok(report)
    }

    /// Remove `name`'s routes from the router and its entry from the registry.
    pub async fn unload(&self, name: &str) -> ModuleHostResult<LoadedModule> {
        let _guard = self.op_lock.lock().await;

        let Some(module) = self.registry.remove(name).await else {
            return Err(ModuleHostError::NotLoaded(name.to_string()));
        };

        if let Some(handle) = module.route_group
            && let Err(e) = self.router.unregister(handle)
        {
            warn!(module = %name, error = %e, "Route group was already gone from router");
        }
        self.source.evict(name);

        info!(module = %name, routes = module.route_count, "Module unloaded");
        let _ = self.event_tx.send(ModuleEvent::Unloaded {
            name: name.to_string(),
        });
        Ok(module)
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.registry.contains(name).await
    }

    /// Last load error recorded for `name`, cleared by the next successful load.
    pub fn last_error(&self, name: &str) -> Option<String> {
        self.last_errors.read().get(name).cloned()
    }

    /// Modules whose most recent load attempt failed.
    pub fn failures(&self) -> HashMap<String, String> {
        self.last_errors.read().clone()
    }

    /// Summaries of every loaded module, sorted by name.
    pub async fn introspect(&self) -> Vec<ModuleSummary> {
        let registered = self.router.list_registered_paths();
        self.registry
            .list()
            .await
            .into_iter()
            .map(|m| self.summarize(m, &registered))
            .collect()
    }

    /// Summary of one loaded module.
    pub async fn module_summary(&self, name: &str) -> Option<ModuleSummary> {
        let module = self.registry.get(name).await?;
        let registered = self.router.list_registered_paths();
        Some(self.summarize(module, &registered))
    }

    fn summarize(
        &self,
        module: LoadedModule,
        registered: &[cardinal_kernel::RegisteredPath],
    ) -> ModuleSummary {
        let prefix = module.prefix.clone().unwrap_or_default();
        let routes: Vec<String> = match module.route_group {
            Some(handle) => owned_paths(registered, handle, &prefix),
            None => Vec::new(),
        };
        let active = module
            .route_group
            .is_none_or(|handle| self.router.is_registered(handle));

        ModuleSummary {
            last_error: self.last_error(&module.name),
            name: module.name,
            prefix: module.prefix,
            route_count: routes.len(),
            routes,
            description: module.description,
            active,
            loaded_at: module.loaded_at,
            reload_count: module.reload_count,
        }
    }

    /// Start the background change watcher.
    ///
    /// Only one watcher loop may run per manager.
    pub async fn start_watcher(self: &Arc<Self>, config: WatchConfig) -> ModuleHostResult<()> {
        let mut slot = self.watcher.lock().await;
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(ModuleHostError::WatcherAlreadyRunning);
        }
        let handle = ModuleWatcher::new(self, config).spawn()?;
        *slot = Some(handle);
        Ok(())
    }

    /// Stop the watcher and wait for its loop to exit.
    ///
    /// Returns `false` if no watcher was running.
    pub async fn stop_watcher(&self) -> bool {
        let handle = self.watcher.lock().await.take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

fn owned_paths(
    registered: &[cardinal_kernel::RegisteredPath],
    handle: RouteGroupHandle,
    prefix: &str,
) -> Vec<String> {
    registered
        .iter()
        .filter(|p| p.group == handle && path_belongs_to_prefix(&p.path, prefix))
        .map(|p| format!("{} {}", p.method, p.path))
        .collect()
}
