//! Router Surface contract
//!
//! The host's HTTP routing table is an external capability. The module core
//! only ever talks to it through [`RouterSurface`]: register a [`RouteGroup`]
//! and receive an opaque [`RouteGroupHandle`], later unregister or replace the
//! group by handle, and list what is currently registered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RouterError;

// ─────────────────────────────────────────────────────────────────────────────
// Methods and handles
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP methods a route can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Case-insensitive parse from a string slice.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// Return the standard uppercase string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a route group registered with a [`RouterSurface`].
///
/// The surface owns the registrations; holders of a handle may only ask for
/// them to be removed or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteGroupHandle(u64);

impl RouteGroupHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RouteGroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

/// A request dispatched to a module's route handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRequest {
    pub method: HttpMethod,
    /// Concrete request path, e.g. `/items/3`.
    pub path: String,
    /// Values captured by `{param}` segments of the route template.
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, if the request carried one.
    pub body: Option<serde_json::Value>,
}

impl ModuleRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: BTreeMap::new(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A handler's answer. `body == None` means an empty response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleResponse {
    pub status: u16,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl ModuleResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: Some(body),
            headers: Vec::new(),
        }
    }

    pub fn ok(body: serde_json::Value) -> Self {
        Self::json(200, body)
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
            headers: Vec::new(),
        }
    }

    /// `{"detail": ...}` error body, the shape module handlers report failures in.
    pub fn error(status: u16, detail: impl Into<String>) -> Self {
        Self::json(status, serde_json::json!({ "detail": detail.into() }))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Route groups
// ─────────────────────────────────────────────────────────────────────────────

/// A single request handler bound by a module.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: ModuleRequest) -> ModuleResponse;
}

/// One route of a group. `path` is relative to the group prefix.
#[derive(Clone)]
pub struct RouteSpec {
    pub method: HttpMethod,
    pub path: String,
    pub handler: Arc<dyn RouteHandler>,
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A set of path-bound handlers sharing an optional prefix.
#[derive(Debug, Clone, Default)]
pub struct RouteGroup {
    pub prefix: String,
    pub routes: Vec<RouteSpec>,
}

impl RouteGroup {
    /// Create an empty group. The prefix is normalized to `""` or `/segment...`
    /// without a trailing slash.
    pub fn new(prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: normalize_prefix(prefix.as_ref()),
            routes: Vec::new(),
        }
    }

    pub fn route(
        mut self,
        method: HttpMethod,
        path: impl Into<String>,
        handler: Arc<dyn RouteHandler>,
    ) -> Self {
        self.push(method, path, handler);
        self
    }

    pub fn push(
        &mut self,
        method: HttpMethod,
        path: impl Into<String>,
        handler: Arc<dyn RouteHandler>,
    ) {
        self.routes.push(RouteSpec {
            method,
            path: path.into(),
            handler,
        });
    }

    /// Absolute path of `route` once the prefix is attached.
    pub fn full_path(&self, route: &RouteSpec) -> String {
        join_path(&self.prefix, &route.path)
    }

    /// `(method, absolute path)` for every route, in declaration order.
    pub fn endpoints(&self) -> Vec<(HttpMethod, String)> {
        self.routes
            .iter()
            .map(|r| (r.method, self.full_path(r)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Attach a route path to a group prefix.
///
/// A route path of `/` (or empty) under a non-empty prefix maps to the prefix
/// itself, so `router("/items").get("/", ...)` serves `/items`.
pub fn join_path(prefix: &str, path: &str) -> String {
    let prefix = normalize_prefix(prefix);
    let path = path.trim();
    let path = if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    if prefix.is_empty() {
        if path.is_empty() { "/".to_string() } else { path }
    } else if path.is_empty() || path == "/" {
        prefix
    } else {
        format!("{prefix}{path}")
    }
}

/// Route attribution rule: a registered path belongs to a group when the
/// group's prefix is empty or `/`, when the path equals the prefix, or when it
/// continues the prefix with a `/` segment boundary.
pub fn path_belongs_to_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() || prefix == "/" {
        return true;
    }
    let prefix = prefix.trim_end_matches('/');
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

// ─────────────────────────────────────────────────────────────────────────────
// Surface
// ─────────────────────────────────────────────────────────────────────────────

/// One registered endpoint as reported by [`RouterSurface::list_registered_paths`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredPath {
    pub path: String,
    pub method: HttpMethod,
    pub group: RouteGroupHandle,
}

/// The host routing table as seen by the module core.
///
/// Methods are synchronous: implementations swap routing snapshots in memory
/// and never block on I/O.
pub trait RouterSurface: Send + Sync {
    /// Register every route of `group` under its prefix.
    fn register_group(&self, group: &RouteGroup) -> Result<RouteGroupHandle, RouterError>;

    /// Remove all routes registered under `handle`.
    fn unregister(&self, handle: RouteGroupHandle) -> Result<(), RouterError>;

    /// Atomically swap the routes of `old` for those of `group`.
    ///
    /// On error `old` stays registered and unchanged.
    fn replace_group(
        &self,
        old: RouteGroupHandle,
        group: &RouteGroup,
    ) -> Result<RouteGroupHandle, RouterError>;

    fn list_registered_paths(&self) -> Vec<RegisteredPath>;

    /// Whether `handle` is currently registered, even if its group has no routes.
    fn is_registered(&self, handle: RouteGroupHandle) -> bool;
}
