//! Module code-loading capability
//!
//! A module is a directory of source files. A [`ModuleSource`] turns such a
//! directory into live [`ModuleCode`], and the host picks the module's route
//! group out of it with [`resolve_route_group`].

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::LoadError;
use crate::router::RouteGroup;

/// Component consulted by the second resolution tier.
pub const ROUTES_COMPONENT: &str = "routes";

/// Loaded, initialized code of one module.
///
/// Each accessor answers one tier of the route-group resolution policy.
pub trait ModuleCode: Send + Sync {
    /// Tier (a): a route group the module exposes directly at top level.
    fn exposed_route_group(&self) -> Option<RouteGroup>;

    /// Tier (b): the route group exposed by a named sub-component.
    fn component_route_group(&self, component: &str) -> Option<RouteGroup>;

    /// Tier (c): every top-level value that is a route group, in declaration order.
    fn candidate_route_groups(&self) -> Vec<RouteGroup>;

    /// Human-readable description for introspection.
    fn description(&self) -> Option<String> {
        None
    }
}

/// Which tier produced a resolved group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteGroupOrigin {
    Exposed,
    Component(String),
    /// Found by scanning top-level values; `candidates` counts all matches seen.
    Scanned { candidates: usize },
}

impl fmt::Display for RouteGroupOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteGroupOrigin::Exposed => f.write_str("exposed"),
            RouteGroupOrigin::Component(name) => write!(f, "component '{name}'"),
            RouteGroupOrigin::Scanned { candidates } => {
                write!(f, "scan ({candidates} candidates)")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRouteGroup {
    pub group: RouteGroup,
    pub origin: RouteGroupOrigin,
}

/// Pick a module's route group: exposed, then the `routes` component, then
/// the first scanned candidate. First match wins; `None` is not an error.
pub fn resolve_route_group(code: &dyn ModuleCode) -> Option<ResolvedRouteGroup> {
    if let Some(group) = code.exposed_route_group() {
        return Some(ResolvedRouteGroup {
            group,
            origin: RouteGroupOrigin::Exposed,
        });
    }

    if let Some(group) = code.component_route_group(ROUTES_COMPONENT) {
        return Some(ResolvedRouteGroup {
            group,
            origin: RouteGroupOrigin::Component(ROUTES_COMPONENT.to_string()),
        });
    }

    let mut candidates = code.candidate_route_groups();
    if candidates.len() > 1 {
        tracing::warn!(
            candidates = candidates.len(),
            "Multiple route groups found, using the first"
        );
    }
    let count = candidates.len();
    if candidates.is_empty() {
        None
    } else {
        Some(ResolvedRouteGroup {
            group: candidates.swap_remove(0),
            origin: RouteGroupOrigin::Scanned { candidates: count },
        })
    }
}

/// Turns module directories into [`ModuleCode`].
///
/// Implementations may cache compiled artifacts per module; [`evict`] must
/// discard them so the next [`load`] re-reads and re-executes everything from
/// disk.
///
/// [`evict`]: ModuleSource::evict
/// [`load`]: ModuleSource::load
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// File whose presence makes a directory a module.
    fn entry_marker(&self) -> &str;

    /// Load and initialize the module `name` rooted at `dir`.
    async fn load(&self, name: &str, dir: &Path) -> Result<Arc<dyn ModuleCode>, LoadError>;

    /// Drop cached artifacts for `name` and its components.
    fn evict(&self, name: &str);
}
