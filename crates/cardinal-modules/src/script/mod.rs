//! Rhai script modules
//!
//! The [`ModuleSource`](cardinal_kernel::ModuleSource) implementation used by
//! the host: modules are directories of `.rhai` scripts that declare their
//! routes with `router(prefix)` and serve requests from script functions.

mod convert;
mod engine;
mod handler;
mod router;
mod source;
mod store;

pub use convert::{dynamic_to_json, json_to_dynamic};
pub use engine::ScriptLimits;
pub use handler::{ScriptHandler, request_to_dynamic, response_from_value};
pub use router::{ScriptRoute, ScriptRouter};
pub use source::{ENTRY_SCRIPT, SCRIPT_EXTENSION, ScriptModule, ScriptModuleSource, compile_module};
pub use store::ModuleStore;
