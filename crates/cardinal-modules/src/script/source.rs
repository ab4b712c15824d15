//! Rhai script modules
//!
//! A module directory holds an entry script `module.rhai` plus any number of
//! component scripts (`routes.rhai` is component `routes`). Loading compiles
//! and runs every component, then the entry script, each in its own scope, on
//! a fresh engine. Top-level variables of each script are kept so the host
//! can find the route group the module declares.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cardinal_kernel::{LoadError, ModuleCode, ModuleSource, RouteGroup};
use parking_lot::RwLock;
use rhai::{AST, Dynamic, Engine, Scope};
use tracing::{debug, info};

use super::engine::{ScriptLimits, build_engine};
use super::handler::ScriptHandler;
use super::router::ScriptRouter;
use super::store::ModuleStore;

/// Entry marker file of a script module.
pub const ENTRY_SCRIPT: &str = "module.rhai";
/// Extension of script source files.
pub const SCRIPT_EXTENSION: &str = "rhai";

/// Top-level variable holding a module's route group.
const ROUTER_VAR: &str = "router";
const DESCRIPTION_VAR: &str = "description";

/// One compiled and initialized script file.
struct ScriptUnit {
    file: String,
    ast: Arc<AST>,
    /// Top-level variables in declaration order, shadowed names collapsed.
    vars: Vec<(String, Dynamic)>,
    /// Functions usable as handlers (0 or 1 parameter) and their arity.
    handlers: HashMap<String, usize>,
}

impl ScriptUnit {
    fn var(&self, name: &str) -> Option<&Dynamic> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn router(&self, name: &str) -> Option<ScriptRouter> {
        self.var(name)?.clone().try_cast::<ScriptRouter>()
    }

    fn routers(&self) -> impl Iterator<Item = ScriptRouter> + '_ {
        self.vars
            .iter()
            .filter_map(|(_, v)| v.clone().try_cast::<ScriptRouter>())
    }
}

/// Loaded code of one script module.
pub struct ScriptModule {
    name: String,
    engine: Arc<Engine>,
    entry: ScriptUnit,
    components: BTreeMap<String, ScriptUnit>,
    store: ModuleStore,
}

impl ScriptModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    pub fn store(&self) -> &ModuleStore {
        &self.store
    }

    fn bind(&self, unit: &ScriptUnit, router: &ScriptRouter) -> RouteGroup {
        let mut group = RouteGroup::new(&router.prefix);
        for route in &router.routes {
            let arity = unit.handlers.get(&route.handler).copied().unwrap_or(1);
            let handler = ScriptHandler::new(
                self.name.clone(),
                self.engine.clone(),
                unit.ast.clone(),
                route.handler.clone(),
                arity,
            );
            group.push(route.method, route.path.clone(), Arc::new(handler));
        }
        group
    }
}

impl ModuleCode for ScriptModule {
    fn exposed_route_group(&self) -> Option<RouteGroup> {
        let router = self.entry.router(ROUTER_VAR)?;
        Some(self.bind(&self.entry, &router))
    }

    fn component_route_group(&self, component: &str) -> Option<RouteGroup> {
        let unit = self.components.get(component)?;
        let router = unit.router(ROUTER_VAR)?;
        Some(self.bind(unit, &router))
    }

    fn candidate_route_groups(&self) -> Vec<RouteGroup> {
        self.entry
            .routers()
            .map(|router| self.bind(&self.entry, &router))
            .collect()
    }

    fn description(&self) -> Option<String> {
        self.entry
            .var(DESCRIPTION_VAR)
            .and_then(|v| v.clone().into_string().ok())
    }
}

fn collect_vars(scope: &Scope) -> Vec<(String, Dynamic)> {
    let mut vars: Vec<(String, Dynamic)> = Vec::new();
    for (name, _constant, value) in scope.iter() {
        match vars.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => vars.push((name.to_string(), value)),
        }
    }
    vars
}

fn collect_handlers(ast: &AST) -> HashMap<String, usize> {
    let mut handlers = HashMap::new();
    for f in ast.iter_functions() {
        let arity = f.params.len();
        if arity > 1 {
            continue;
        }
        handlers
            .entry(f.name.to_string())
            .and_modify(|a: &mut usize| *a = (*a).max(arity))
            .or_insert(arity);
    }
    handlers
}

fn compile_unit(engine: &Engine, path: &Path) -> Result<ScriptUnit, LoadError> {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let source = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;

    let mut ast = engine.compile(&source).map_err(|e| LoadError::Compile {
        file: file.clone(),
        message: e.to_string(),
    })?;
    ast.set_source(file.as_str());

    let mut scope = Scope::new();
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| LoadError::Init {
            file: file.clone(),
            message: e.to_string(),
        })?;

    let unit = ScriptUnit {
        vars: collect_vars(&scope),
        handlers: collect_handlers(&ast),
        ast: Arc::new(ast),
        file,
    };

    for router in unit.routers() {
        for route in &router.routes {
            if !unit.handlers.contains_key(&route.handler) {
                return Err(LoadError::InvalidRoute {
                    file: unit.file.clone(),
                    message: format!(
                        "handler '{}' for {} {} is not a function taking zero or one argument",
                        route.handler, route.method, route.path
                    ),
                });
            }
        }
    }

    Ok(unit)
}

fn component_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|e| LoadError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension().and_then(|e| e.to_str()) == Some(SCRIPT_EXTENSION)
                && p.file_name().and_then(|n| n.to_str()) != Some(ENTRY_SCRIPT)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Compile and initialize the module at `dir`. Blocking.
pub fn compile_module(
    name: &str,
    dir: &Path,
    limits: &ScriptLimits,
) -> Result<ScriptModule, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::NotFound(dir.to_path_buf()));
    }
    let entry_path = dir.join(ENTRY_SCRIPT);
    if !entry_path.is_file() {
        return Err(LoadError::MissingEntry {
            marker: ENTRY_SCRIPT.to_string(),
            dir: dir.to_path_buf(),
        });
    }

    let store = ModuleStore::new();
    let engine = Arc::new(build_engine(name, limits, &store));

    let mut components = BTreeMap::new();
    for path in component_files(dir)? {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        debug!(module = %name, component = %stem, "Compiling component");
        components.insert(stem, compile_unit(&engine, &path)?);
    }
    let entry = compile_unit(&engine, &entry_path)?;

    Ok(ScriptModule {
        name: name.to_string(),
        engine,
        entry,
        components,
        store,
    })
}

/// [`ModuleSource`] for Rhai script modules.
///
/// Compiled modules are cached by name until [`ModuleSource::evict`].
pub struct ScriptModuleSource {
    limits: ScriptLimits,
    cache: RwLock<HashMap<String, Arc<ScriptModule>>>,
}

impl ScriptModuleSource {
    pub fn new(limits: ScriptLimits) -> Self {
        Self {
            limits,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Names with cached artifacts.
    pub fn cached_modules(&self) -> Vec<String> {
        let mut names: Vec<_> = self.cache.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Cached compiled module, if any.
    pub fn cached(&self, name: &str) -> Option<Arc<ScriptModule>> {
        self.cache.read().get(name).cloned()
    }
}

impl Default for ScriptModuleSource {
    fn default() -> Self {
        Self::new(ScriptLimits::default())
    }
}

#[async_trait]
impl ModuleSource for ScriptModuleSource {
    fn entry_marker(&self) -> &str {
        ENTRY_SCRIPT
    }

    async fn load(&self, name: &str, dir: &Path) -> Result<Arc<dyn ModuleCode>, LoadError> {
        let cached = self.cached(name);
        if let Some(module) = cached {
            debug!(module = %name, "Using cached script module");
            return Ok(module as Arc<dyn ModuleCode>);
        }

        let owned_name = name.to_string();
        let owned_dir = dir.to_path_buf();
        let limits = self.limits.clone();
        let module = tokio::task::spawn_blocking(move || {
            compile_module(&owned_name, &owned_dir, &limits)
        })
        .await
        .map_err(|e| LoadError::Init {
            file: ENTRY_SCRIPT.to_string(),
            message: format!("loader task failed: {e}"),
        })??;

        let module = Arc::new(module);
        info!(
            module = %name,
            components = module.components.len(),
            "Compiled script module"
        );
        self.cache.write().insert(name.to_string(), module.clone());
        Ok(module as Arc<dyn ModuleCode>)
    }

    fn evict(&self, name: &str) {
        if self.cache.write().remove(name).is_some() {
            debug!(module = %name, "Evicted cached script module");
        }
    }
}
