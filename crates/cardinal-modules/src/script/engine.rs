//! Script engine setup
//!
//! Every module load gets its own [`Engine`] carrying the route-declaration
//! API, logging forwarded to `tracing`, JSON helpers and the module's store.

use rhai::{Dynamic, Engine, INT};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::convert::{dynamic_to_json, json_to_dynamic};
use super::router::register_router_api;
use super::store::ModuleStore;

/// Execution limits applied to every module engine.
///
/// These bound runaway scripts; they are not request timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    /// Maximum number of operations per script run (0 = unlimited)
    pub max_operations: u64,
    /// Maximum function call depth
    pub max_call_levels: usize,
    /// Maximum string length (0 = unlimited)
    pub max_string_size: usize,
    /// Maximum array length (0 = unlimited)
    pub max_array_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 10_000_000,
            max_call_levels: 64,
            max_string_size: 1_000_000,
            max_array_size: 100_000,
        }
    }
}

/// Build the engine for one load of `module`.
pub(crate) fn build_engine(module: &str, limits: &ScriptLimits, store: &ModuleStore) -> Engine {
    let mut engine = Engine::new();
    apply_limits(&mut engine, limits);
    register_logging(&mut engine, module);
    register_helpers(&mut engine);
    register_router_api(&mut engine);
    store.register(&mut engine);
    engine
}

fn apply_limits(engine: &mut Engine, limits: &ScriptLimits) {
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
}

fn register_logging(engine: &mut Engine, module: &str) {
    let name = module.to_string();
    engine.on_print(move |msg| {
        info!(target: "cardinal::script", module = %name, "{msg}");
    });

    let name = module.to_string();
    engine.on_debug(move |msg, source, pos| {
        debug!(
            target: "cardinal::script",
            module = %name,
            source = source.unwrap_or(""),
            position = %pos,
            "{msg}"
        );
    });

    let name = module.to_string();
    engine.register_fn("warn", move |msg: &str| {
        warn!(target: "cardinal::script", module = %name, "{msg}");
    });

    let name = module.to_string();
    engine.register_fn("error", move |msg: &str| {
        error!(target: "cardinal::script", module = %name, "{msg}");
    });
}

fn register_helpers(engine: &mut Engine) {
    engine.register_fn("to_json", |value: Dynamic| -> String {
        dynamic_to_json(&value).to_string()
    });

    engine.register_fn("from_json", |json: &str| -> Dynamic {
        serde_json::from_str::<serde_json::Value>(json)
            .map(|v| json_to_dynamic(&v))
            .unwrap_or(Dynamic::UNIT)
    });

    engine.register_fn("now", || -> String { chrono::Utc::now().to_rfc3339() });

    engine.register_fn("now_ms", || -> INT { chrono::Utc::now().timestamp_millis() });
}
