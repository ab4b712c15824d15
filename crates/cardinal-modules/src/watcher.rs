//! Module change watcher
//!
//! A cancellable polling loop over the modules root. Each tick runs one
//! detection pass: a discovered module is loaded when the watcher has no
//! baseline for it yet, or when its newest source file is strictly newer than
//! the recorded baseline. Optionally a `notify` watcher wakes the loop early
//! after filesystem events; detection semantics stay the same.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::newest_source_mtime;
use crate::error::{ModuleHostError, ModuleHostResult};
use crate::manager::{LoadFailure, ModuleManager};

/// Watch configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Delay between ticks
    pub poll_interval: Duration,
    /// Delay after a failed tick
    pub error_backoff: Duration,
    /// File extensions that count as module sources
    pub extensions: Vec<String>,
    /// Ignore patterns (`*suffix`, `prefix*` or exact file name)
    pub ignore_patterns: Vec<String>,
    /// Wake the loop early on filesystem events
    pub fs_events: bool,
    /// Unload modules whose directory disappeared
    pub unload_removed: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
            extensions: vec!["rhai".to_string()],
            ignore_patterns: vec!["*.tmp".to_string(), "*.swp".to_string(), "*~".to_string()],
            fs_events: false,
            unload_removed: false,
        }
    }
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Add file extension to watch
    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extensions.push(ext.to_string());
        self
    }

    /// Add ignore pattern
    pub fn with_ignore(mut self, pattern: &str) -> Self {
        self.ignore_patterns.push(pattern.to_string());
        self
    }

    pub fn with_fs_events(mut self, enabled: bool) -> Self {
        self.fs_events = enabled;
        self
    }

    pub fn with_unload_removed(mut self, enabled: bool) -> Self {
        self.unload_removed = enabled;
        self
    }

    /// Check if a file contributes to a module's change timestamp
    pub fn should_watch(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !self.extensions.is_empty() && !self.extensions.iter().any(|e| e == ext) {
            return false;
        }

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        !self.ignore_patterns.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix('*') {
                file_name.ends_with(suffix)
            } else if let Some(prefix) = pattern.strip_suffix('*') {
                file_name.starts_with(prefix)
            } else {
                file_name == pattern
            }
        })
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub loaded: Vec<String>,
    pub failed: Vec<LoadFailure>,
    pub unloaded: Vec<String>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty() && self.failed.is_empty() && self.unloaded.is_empty()
    }
}

/// Polling change detector bound to one [`ModuleManager`].
///
/// Holds only a weak reference to the manager; the loop exits once the
/// manager is dropped.
pub struct ModuleWatcher {
    manager: Weak<ModuleManager>,
    config: WatchConfig,
    /// Newest seen source timestamp per module.
    state: HashMap<String, SystemTime>,
}

impl ModuleWatcher {
    pub fn new(manager: &Arc<ModuleManager>, config: WatchConfig) -> Self {
        Self {
            manager: Arc::downgrade(manager),
            config,
            state: HashMap::new(),
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Baseline timestamp recorded for `name`.
    pub fn baseline(&self, name: &str) -> Option<SystemTime> {
        self.state.get(name).copied()
    }

    /// Run one detection pass.
    pub async fn tick(&mut self) -> ModuleHostResult<TickReport> {
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| ModuleHostError::WatcherTick("module manager dropped".to_string()))?;

        let names = manager
            .discover()
            .map_err(|e| ModuleHostError::WatcherTick(e.to_string()))?;

        let mut report = TickReport::default();
        for name in &names {
            let dir = manager.root().join(name);
            let newest = newest_source_mtime(&dir, &self.config).unwrap_or(SystemTime::UNIX_EPOCH);

            let changed = match self.state.get(name) {
                None => true,
                Some(seen) => newest > *seen,
            };
            if !changed {
                continue;
            }

            debug!(module = %name, "Change detected");
            self.state.insert(name.clone(), newest);
            match manager.load(name).await {
                Ok(_) => report.loaded.push(name.clone()),
                Err(e) => report.failed.push(LoadFailure {
                    name: name.clone(),
                    error: e.to_string(),
                }),
            }
        }

        let present: HashSet<&String> = names.iter().collect();
        self.state.retain(|name, _| present.contains(name));

        if self.config.unload_removed {
            for name in manager.registry().names().await {
                if present.contains(&name) {
                    continue;
                }
                info!(module = %name, "Module directory removed, unloading");
                match manager.unload(&name).await {
                    Ok(_) => report.unloaded.push(name),
                    Err(ModuleHostError::NotLoaded(_)) => {}
                    Err(e) => warn!(module = %name, error = %e, "Failed to unload removed module"),
                }
            }
        }

        Ok(report)
    }

    /// Spawn the polling loop.
    pub fn spawn(self) -> ModuleHostResult<WatcherHandle> {
        let root = self
            .manager
            .upgrade()
            .map(|m| m.root().to_path_buf())
            .ok_or_else(|| ModuleHostError::WatcherSetup("module manager dropped".to_string()))?;

        let (wake, fs_watcher) = if self.config.fs_events {
            let (tx, rx) = mpsc::channel::<()>(1);
            let filter = self.config.clone();
            let mut watcher = RecommendedWatcher::new(
                move |result: Result<Event, notify::Error>| {
                    if let Ok(event) = result
                        && event.paths.iter().any(|p| filter.should_watch(p))
                    {
                        let _ = tx.try_send(());
                    }
                },
                notify::Config::default(),
            )
            .map_err(|e| ModuleHostError::WatcherSetup(e.to_string()))?;
            watcher
                .watch(&root, RecursiveMode::Recursive)
                .map_err(|e| ModuleHostError::WatcherSetup(e.to_string()))?;
            (Some(rx), Some(watcher))
        } else {
            (None, None)
        };

        info!(
            root = %root.display(),
            interval_ms = self.config.poll_interval.as_millis() as u64,
            fs_events = self.config.fs_events,
            "Starting module watcher"
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone(), wake));
        Ok(WatcherHandle {
            cancel,
            task,
            _fs_watcher: fs_watcher,
        })
    }

    async fn run(mut self, cancel: CancellationToken, mut wake: Option<mpsc::Receiver<()>>) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let delay = match self.tick().await {
                Ok(report) => {
                    if !report.is_empty() {
                        debug!(
                            loaded = report.loaded.len(),
                            failed = report.failed.len(),
                            unloaded = report.unloaded.len(),
                            "Watcher tick applied changes"
                        );
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    if self.manager.strong_count() == 0 {
                        break;
                    }
                    warn!(
                        error = %e,
                        backoff_ms = self.config.error_backoff.as_millis() as u64,
                        "Watcher tick failed"
                    );
                    self.config.error_backoff
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
                Some(()) = next_wake(&mut wake) => {
                    if let Some(rx) = wake.as_mut() {
                        while rx.try_recv().is_ok() {}
                    }
                }
            }
        }
        info!("Module watcher stopped");
    }
}

async fn next_wake(wake: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match wake {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to a running watcher loop.
pub struct WatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _fs_watcher: Option<RecommendedWatcher>,
}

impl WatcherHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    ///
    /// A tick in progress runs to completion first.
    pub async fn stop(self) {
        self.cancel.cancel();
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "Module watcher task ended abnormally"),
        }
    }
}
