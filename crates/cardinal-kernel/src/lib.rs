//! Cardinal Kernel
//!
//! Contracts shared by the module host (`cardinal-modules`) and the HTTP
//! gateway (`cardinal-gateway`):
//!
//! - [`router`]: the Router Surface capability, route groups and handlers
//! - [`module`]: the module code-loading capability and route-group resolution
//! - [`error`]: kernel error types
//! - [`config`]: layered configuration loading (feature `config`)

pub mod error;
pub mod module;
pub mod router;

#[cfg(feature = "config")]
pub mod config;

pub use error::{LoadError, RouterError};
pub use module::{
    ModuleCode, ModuleSource, ROUTES_COMPONENT, ResolvedRouteGroup, RouteGroupOrigin,
    resolve_route_group,
};
pub use router::{
    HttpMethod, ModuleRequest, ModuleResponse, RegisteredPath, RouteGroup, RouteGroupHandle,
    RouteHandler, RouteSpec, RouterSurface, join_path, path_belongs_to_prefix,
};
