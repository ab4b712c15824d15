//! Cardinal module host
//!
//! Discovers module packages under a root directory, loads them into the
//! running process, attaches their route groups to the host router and
//! reloads or unloads them while the process keeps serving.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ModuleManager                          │
//! │  ┌──────────────┐ ┌──────────────┐ ┌─────────────────────┐  │
//! │  │  discovery   │ │   registry   │ │    ModuleWatcher    │  │
//! │  │ (root scan)  │ │ (live state) │ │ (polling, notify)   │  │
//! │  └──────────────┘ └──────────────┘ └─────────────────────┘  │
//! │          │                │                   │             │
//! │          ▼                ▼                   ▼             │
//! │  ┌───────────────────┐        ┌─────────────────────────┐   │
//! │  │ dyn ModuleSource  │        │   dyn RouterSurface     │   │
//! │  │ (script modules)  │        │ (host routing table)    │   │
//! │  └───────────────────┘        └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod discovery;
pub mod error;
pub mod manager;
pub mod registry;
pub mod script;
pub mod watcher;

pub use discovery::discover;
pub use error::{ModuleHostError, ModuleHostResult};
pub use manager::{LoadFailure, LoadReport, ModuleEvent, ModuleManager, ModuleSummary};
pub use registry::{LoadedModule, ModuleRegistry};
pub use script::{ScriptLimits, ScriptModuleSource};
pub use watcher::{ModuleWatcher, TickReport, WatchConfig, WatcherHandle};
