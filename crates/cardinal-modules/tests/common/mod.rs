#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use cardinal_kernel::{
    HttpMethod, ModuleRequest, ModuleResponse, RegisteredPath, RouteGroup, RouteGroupHandle,
    RouteSpec, RouterError, RouterSurface,
};
use cardinal_modules::{ModuleManager, ScriptModuleSource};
use parking_lot::Mutex;

/// In-memory router keeping the registered groups by handle.
#[derive(Default)]
pub struct MemoryRouter {
    groups: Mutex<BTreeMap<RouteGroupHandle, RouteGroup>>,
    next: AtomicU64,
}

impl MemoryRouter {
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .list_registered_paths()
            .into_iter()
            .map(|p| p.path)
            .collect();
        paths.sort();
        paths
    }

    pub fn find(&self, method: HttpMethod, path: &str) -> Option<RouteSpec> {
        self.groups.lock().values().find_map(|g| {
            g.routes
                .iter()
                .find(|r| r.method == method && g.full_path(r) == path)
                .cloned()
        })
    }

    pub async fn call(&self, method: HttpMethod, path: &str) -> Option<ModuleResponse> {
        let route = self.find(method, path)?;
        Some(route.handler.handle(ModuleRequest::new(method, path)).await)
    }

    fn allocate(&self) -> RouteGroupHandle {
        RouteGroupHandle::new(self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl RouterSurface for MemoryRouter {
    fn register_group(&self, group: &RouteGroup) -> Result<RouteGroupHandle, RouterError> {
        let handle = self.allocate();
        self.groups.lock().insert(handle, group.clone());
        Ok(handle)
    }

    fn unregister(&self, handle: RouteGroupHandle) -> Result<(), RouterError> {
        self.groups
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or(RouterError::UnknownGroup(handle))
    }

    fn replace_group(
        &self,
        old: RouteGroupHandle,
        group: &RouteGroup,
    ) -> Result<RouteGroupHandle, RouterError> {
        let mut groups = self.groups.lock();
        if groups.remove(&old).is_none() {
            return Err(RouterError::UnknownGroup(old));
        }
        let handle = self.allocate();
        groups.insert(handle, group.clone());
        Ok(handle)
    }

    fn list_registered_paths(&self) -> Vec<RegisteredPath> {
        self.groups
            .lock()
            .iter()
            .flat_map(|(handle, group)| {
                group.endpoints().into_iter().map(|(method, path)| RegisteredPath {
                    path,
                    method,
                    group: *handle,
                })
            })
            .collect()
    }

    fn is_registered(&self, handle: RouteGroupHandle) -> bool {
        self.groups.lock().contains_key(&handle)
    }
}

pub struct Host {
    pub tmp: tempfile::TempDir,
    pub router: Arc<MemoryRouter>,
    pub manager: Arc<ModuleManager>,
}

impl Host {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let router = Arc::new(MemoryRouter::default());
        let manager = ModuleManager::new(
            tmp.path().join("modules"),
            Arc::new(ScriptModuleSource::default()),
            router.clone(),
        )
        .unwrap();
        Self {
            tmp,
            router,
            manager,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.manager.root().to_path_buf()
    }

    pub fn write(&self, module: &str, file: &str, body: &str) -> PathBuf {
        let dir = self.root().join(module);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        fs::write(&path, body).unwrap();
        path
    }
}

/// Set a file's modification time relative to now.
pub fn set_mtime(path: &Path, offset: Duration, forward: bool) {
    let now = SystemTime::now();
    let time = if forward { now + offset } else { now - offset };
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

pub const BILLING: &str = r#"
let description = "Billing";
fn invoice(req) { #{ invoice: 1 } }
let router = router("/billing");
router.get("/invoice", "invoice");
"#;

pub const REPORTS: &str = r#"
let description = "Reports without routes";
"#;
