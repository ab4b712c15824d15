//! Dynamic axum routing for module route groups.
//!
//! [`DynamicRouter`] implements [`RouterSurface`]. Registrations live in a
//! table keyed by [`RouteGroupHandle`]; every mutation validates the table,
//! rebuilds an immutable `axum::Router` snapshot from it and swaps the
//! snapshot in. Requests clone the current snapshot before dispatch, so a
//! request keeps the handler it started with even if its module is reloaded
//! or unloaded meanwhile.

pub mod path;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, Request},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
};
use cardinal_kernel::{
    HttpMethod, ModuleRequest, ModuleResponse, RegisteredPath, RouteGroup, RouteGroupHandle,
    RouteHandler, RouterError, RouterSurface, path_belongs_to_prefix,
};
use parking_lot::RwLock;
use serde_json::json;
use tower::ServiceExt;
use tracing::{debug, warn};

/// Default limit for module request bodies.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// One endpoint of a registered group, with its absolute path.
#[derive(Clone)]
struct BoundRoute {
    method: HttpMethod,
    path: String,
    handler: Arc<dyn RouteHandler>,
}

struct Registration {
    prefix: String,
    routes: Vec<BoundRoute>,
}

#[derive(Default)]
struct RouteTable {
    groups: BTreeMap<RouteGroupHandle, Registration>,
    next_id: u64,
}

impl RouteTable {
    fn allocate(&mut self) -> RouteGroupHandle {
        self.next_id += 1;
        RouteGroupHandle::new(self.next_id)
    }
}

/// [`RouterSurface`] implementation serving module routes through axum.
pub struct DynamicRouter {
    table: RwLock<RouteTable>,
    snapshot: RwLock<Router>,
    reserved: Vec<String>,
    body_limit: usize,
}

impl DynamicRouter {
    /// Create an empty router. Paths under any of `reserved` are refused.
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reserved = reserved
            .into_iter()
            .map(|p| p.into().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            table: RwLock::new(RouteTable::default()),
            snapshot: RwLock::new(empty_router()),
            reserved,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn reserved_prefixes(&self) -> &[String] {
        &self.reserved
    }

    /// Number of registered groups.
    pub fn group_count(&self) -> usize {
        self.table.read().groups.len()
    }

    /// The current routing snapshot.
    pub fn snapshot(&self) -> Router {
        self.snapshot.read().clone()
    }

    /// Serve `request` with the current snapshot.
    pub async fn dispatch(&self, request: Request) -> Response {
        let router = self.snapshot();
        match router.oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    fn bind(&self, group: &RouteGroup) -> Result<Vec<BoundRoute>, RouterError> {
        let mut routes = Vec::with_capacity(group.len());
        for route in &group.routes {
            let full = group.full_path(route);
            path::validate(&full)?;
            if let Some(prefix) = self
                .reserved
                .iter()
                .find(|prefix| path_belongs_to_prefix(&full, prefix))
            {
                return Err(RouterError::Reserved {
                    path: full,
                    prefix: prefix.clone(),
                });
            }
            routes.push(BoundRoute {
                method: route.method,
                path: full,
                handler: route.handler.clone(),
            });
        }
        Ok(routes)
    }

    /// Check `routes` for duplicates among themselves and against every
    /// registered group except `ignore`.
    fn check_conflicts(
        table: &RouteTable,
        handle: RouteGroupHandle,
        routes: &[BoundRoute],
        ignore: Option<RouteGroupHandle>,
    ) -> Result<(), RouterError> {
        let mut taken: HashMap<(HttpMethod, String), RouteGroupHandle> = HashMap::new();
        for (owner, registration) in &table.groups {
            if Some(*owner) == ignore {
                continue;
            }
            for route in &registration.routes {
                taken.insert((route.method, path::routing_key(&route.path)?), *owner);
            }
        }

        for route in routes {
            let routing_key = path::routing_key(&route.path)?;
            if let Some((_, owner)) = taken
                .iter()
                .find(|((_, other), _)| path::keys_clash(&routing_key, other))
            {
                return Err(RouterError::Conflict {
                    method: route.method,
                    path: route.path.clone(),
                    owner: *owner,
                });
            }
            if let Some(owner) = taken.insert((route.method, routing_key), handle) {
                return Err(RouterError::Conflict {
                    method: route.method,
                    path: route.path.clone(),
                    owner,
                });
            }
        }
        Ok(())
    }

    fn rebuild(&self, table: &RouteTable) -> Result<(), RouterError> {
        let mut by_key: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for registration in table.groups.values() {
            for route in &registration.routes {
                let key = path::routing_key(&route.path)?;
                let endpoint = Arc::new(route.clone());
                let limit = self.body_limit;
                let handler = move |request: Request| {
                    let endpoint = endpoint.clone();
                    async move { serve_module_route(endpoint, request, limit).await }
                };
                let entry = by_key.remove(&key).unwrap_or_else(MethodRouter::new);
                by_key.insert(key, entry.on(method_filter(route.method), handler));
            }
        }

        let router = by_key
            .into_iter()
            .fold(empty_router(), |router, (key, methods)| {
                router.route(&key, methods)
            });
        *self.snapshot.write() = router;
        Ok(())
    }
}

impl Default for DynamicRouter {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl RouterSurface for DynamicRouter {
    fn register_group(&self, group: &RouteGroup) -> Result<RouteGroupHandle, RouterError> {
        let routes = self.bind(group)?;
        let mut table = self.table.write();
        let handle = table.allocate();
        Self::check_conflicts(&table, handle, &routes, None)?;

        table.groups.insert(
            handle,
            Registration {
                prefix: group.prefix.clone(),
                routes,
            },
        );
        if let Err(e) = self.rebuild(&table) {
            table.groups.remove(&handle);
            return Err(e);
        }

        debug!(
            group = %handle,
            prefix = %group.prefix,
            routes = group.len(),
            "Route group registered"
        );
        Ok(handle)
    }

    fn unregister(&self, handle: RouteGroupHandle) -> Result<(), RouterError> {
        let mut table = self.table.write();
        let Some(registration) = table.groups.remove(&handle) else {
            return Err(RouterError::UnknownGroup(handle));
        };
        if let Err(e) = self.rebuild(&table) {
            table.groups.insert(handle, registration);
            return Err(e);
        }

        debug!(group = %handle, prefix = %registration.prefix, "Route group unregistered");
        Ok(())
    }

    fn replace_group(
        &self,
        old: RouteGroupHandle,
        group: &RouteGroup,
    ) -> Result<RouteGroupHandle, RouterError> {
        let routes = self.bind(group)?;
        let mut table = self.table.write();
        if !table.groups.contains_key(&old) {
            return Err(RouterError::UnknownGroup(old));
        }
        let handle = table.allocate();
        Self::check_conflicts(&table, handle, &routes, Some(old))?;

        let previous = table.groups.remove(&old);
        table.groups.insert(
            handle,
            Registration {
                prefix: group.prefix.clone(),
                routes,
            },
        );
        if let Err(e) = self.rebuild(&table) {
            table.groups.remove(&handle);
            if let Some(previous) = previous {
                table.groups.insert(old, previous);
            }
            return Err(e);
        }

        debug!(
            old = %old,
            group = %handle,
            prefix = %group.prefix,
            routes = group.len(),
            "Route group replaced"
        );
        Ok(handle)
    }

    fn list_registered_paths(&self) -> Vec<RegisteredPath> {
        let table = self.table.read();
        let mut paths: Vec<RegisteredPath> = table
            .groups
            .iter()
            .flat_map(|(handle, registration)| {
                registration.routes.iter().map(|route| RegisteredPath {
                    path: route.path.clone(),
                    method: route.method,
                    group: *handle,
                })
            })
            .collect();
        paths.sort_by(|a, b| a.path.cmp(&b.path).then(a.method.cmp(&b.method)));
        paths
    }

    fn is_registered(&self, handle: RouteGroupHandle) -> bool {
        self.table.read().groups.contains_key(&handle)
    }
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
        HttpMethod::Head => MethodFilter::HEAD,
        HttpMethod::Options => MethodFilter::OPTIONS,
    }
}

fn empty_router() -> Router {
    Router::new().fallback(not_found)
}

async fn not_found(request: Request) -> Response {
    let message = format!("no route for {} {}", request.method(), request.uri().path());
    (StatusCode::NOT_FOUND, Json(json!({ "detail": message }))).into_response()
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    into_axum_response(ModuleResponse::error(status.as_u16(), message))
}

/// Translate an HTTP request into a [`ModuleRequest`] and run the route's handler.
async fn serve_module_route(route: Arc<BoundRoute>, request: Request, limit: usize) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return detail(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("unreadable request body: {e}"),
            );
        }
    };
    let body = if bytes.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => return detail(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}")),
        }
    };

    let query = match Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri) {
        Ok(Query(query)) => query,
        Err(e) => return detail(StatusCode::BAD_REQUEST, format!("invalid query string: {e}")),
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let module_request = ModuleRequest {
        method: route.method,
        path: parts.uri.path().to_string(),
        params: path::match_path(&route.path, parts.uri.path()).unwrap_or_default(),
        query,
        headers,
        body,
    };

    into_axum_response(route.handler.handle(module_request).await)
}

/// Convert a module handler's answer into an axum response.
pub fn into_axum_response(response: ModuleResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        warn!(status = response.status, "Handler returned an invalid status code");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut out = match response.body {
        Some(body) => Json(body).into_response(),
        None => Body::empty().into_response(),
    };
    *out.status_mut() = status;

    for (name, value) in response.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().append(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid response header"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::Method;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct Echo(&'static str);

    #[async_trait]
    impl RouteHandler for Echo {
        async fn handle(&self, request: ModuleRequest) -> ModuleResponse {
            ModuleResponse::ok(json!({
                "tag": self.0,
                "params": request.params,
                "query": request.query,
                "body": request.body,
            }))
        }
    }

    /// Blocks until released, then answers 200.
    struct Gate(Arc<Notify>, Arc<Notify>);

    #[async_trait]
    impl RouteHandler for Gate {
        async fn handle(&self, _request: ModuleRequest) -> ModuleResponse {
            self.0.notify_one();
            self.1.notified().await;
            ModuleResponse::ok(json!("finished"))
        }
    }

    fn echo(tag: &'static str) -> Arc<dyn RouteHandler> {
        Arc::new(Echo(tag))
    }

    fn request(method: Method, uri: &str, body: Option<&str>) -> Request {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap()
    }

    async fn call(
        router: &DynamicRouter,
        method: Method,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let response = router.dispatch(request(method, uri, body)).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn registered_routes_are_served() {
        let router = DynamicRouter::default();
        let group = RouteGroup::new("/items")
            .route(HttpMethod::Get, "/", echo("list"))
            .route(HttpMethod::Get, "/{item_id}", echo("get"))
            .route(HttpMethod::Post, "/", echo("create"));
        router.register_group(&group).unwrap();

        let (status, body) = call(&router, Method::GET, "/items/7?verbose=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tag"], "get");
        assert_eq!(body["params"]["item_id"], "7");
        assert_eq!(body["query"]["verbose"], "true");

        let (status, body) = call(&router, Method::POST, "/items", Some(r#"{"name":"x"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tag"], "create");
        assert_eq!(body["body"]["name"], "x");
    }

    #[tokio::test]
    async fn unknown_paths_and_methods() {
        let router = DynamicRouter::default();
        router
            .register_group(&RouteGroup::new("/items").route(HttpMethod::Get, "/", echo("list")))
            .unwrap();

        let (status, body) = call(&router, Method::GET, "/nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("/nothing"));

        let (status, _) = call(&router, Method::DELETE, "/items", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn invalid_json_body_is_rejected() {
        let router = DynamicRouter::default();
        router
            .register_group(&RouteGroup::new("").route(HttpMethod::Post, "/x", echo("x")))
            .unwrap();

        let (status, body) = call(&router, Method::POST, "/x", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().starts_with("invalid JSON body"));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let router = DynamicRouter::default().with_body_limit(16);
        router
            .register_group(&RouteGroup::new("").route(HttpMethod::Post, "/x", echo("x")))
            .unwrap();

        let (status, _) = call(&router, Method::POST, "/x", Some(r#"{"a":1}"#)).await;
        assert_eq!(status, StatusCode::OK);

        let big = format!(r#"{{"name":"{}"}}"#, "x".repeat(64));
        let (status, body) = call(&router, Method::POST, "/x", Some(&big)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["detail"].is_string());
    }

    #[test]
    fn duplicate_routes_conflict() {
        let router = DynamicRouter::default();
        let first = router
            .register_group(&RouteGroup::new("/items").route(HttpMethod::Get, "/{id}", echo("a")))
            .unwrap();

        let err = router
            .register_group(
                &RouteGroup::new("/items").route(HttpMethod::Get, "/{item_id}", echo("b")),
            )
            .unwrap_err();
        assert!(matches!(err, RouterError::Conflict { owner, .. } if owner == first));

        router
            .register_group(
                &RouteGroup::new("/items").route(HttpMethod::Delete, "/{item_id}", echo("c")),
            )
            .unwrap();
        assert_eq!(router.group_count(), 2);
    }

    #[test]
    fn duplicates_within_one_group_conflict() {
        let router = DynamicRouter::default();
        let group = RouteGroup::new("/a")
            .route(HttpMethod::Get, "/x", echo("1"))
            .route(HttpMethod::Get, "/x", echo("2"));
        assert!(matches!(
            router.register_group(&group),
            Err(RouterError::Conflict { .. })
        ));
        assert_eq!(router.group_count(), 0);
    }

    #[test]
    fn reserved_and_invalid_paths_are_refused() {
        let router = DynamicRouter::new(["/health", "/api/"]);
        let err = router
            .register_group(&RouteGroup::new("/api").route(HttpMethod::Get, "/modules", echo("x")))
            .unwrap_err();
        assert_eq!(
            err,
            RouterError::Reserved {
                path: "/api/modules".into(),
                prefix: "/api".into()
            }
        );

        router
            .register_group(&RouteGroup::new("/apiary").route(HttpMethod::Get, "/", echo("ok")))
            .unwrap();

        let err = router
            .register_group(&RouteGroup::new("/x").route(HttpMethod::Get, "/:id", echo("x")))
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn replace_swaps_routes_atomically() {
        let router = DynamicRouter::default();
        let old = router
            .register_group(
                &RouteGroup::new("/billing")
                    .route(HttpMethod::Get, "/invoice", echo("v1"))
                    .route(HttpMethod::Get, "/legacy", echo("v1")),
            )
            .unwrap();

        let new = router
            .replace_group(
                old,
                &RouteGroup::new("/billing").route(HttpMethod::Get, "/invoice", echo("v2")),
            )
            .unwrap();
        assert_ne!(old, new);

        let (_, body) = call(&router, Method::GET, "/billing/invoice", None).await;
        assert_eq!(body["tag"], "v2");
        let (status, _) = call(&router, Method::GET, "/billing/legacy", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(router.unregister(old), Err(RouterError::UnknownGroup(old)));
    }

    #[tokio::test]
    async fn failed_replace_keeps_old_group() {
        let router = DynamicRouter::default();
        let other = router
            .register_group(
                &RouteGroup::new("/reports").route(HttpMethod::Get, "/daily", echo("r")),
            )
            .unwrap();
        let old = router
            .register_group(
                &RouteGroup::new("/billing").route(HttpMethod::Get, "/invoice", echo("v1")),
            )
            .unwrap();

        let err = router
            .replace_group(
                old,
                &RouteGroup::new("")
                    .route(HttpMethod::Get, "/billing/invoice", echo("v2"))
                    .route(HttpMethod::Get, "/reports/daily", echo("v2")),
            )
            .unwrap_err();
        assert!(matches!(err, RouterError::Conflict { owner, .. } if owner == other));

        let (_, body) = call(&router, Method::GET, "/billing/invoice", None).await;
        assert_eq!(body["tag"], "v1");
        assert!(router.list_registered_paths().iter().any(|p| p.group == old));
    }

    #[test]
    fn unregister_removes_every_path() {
        let router = DynamicRouter::default();
        let handle = router
            .register_group(
                &RouteGroup::new("/a")
                    .route(HttpMethod::Get, "/", echo("1"))
                    .route(HttpMethod::Post, "/", echo("2")),
            )
            .unwrap();
        assert_eq!(router.list_registered_paths().len(), 2);

        router.unregister(handle).unwrap();
        assert!(router.list_registered_paths().is_empty());
        assert_eq!(router.unregister(handle), Err(RouterError::UnknownGroup(handle)));
    }

    #[test]
    fn empty_group_stays_registered() {
        let router = DynamicRouter::default();
        let handle = router.register_group(&RouteGroup::new("/empty")).unwrap();
        assert!(router.list_registered_paths().is_empty());
        assert!(router.is_registered(handle));

        router.unregister(handle).unwrap();
        assert!(!router.is_registered(handle));
    }

    #[tokio::test]
    async fn in_flight_request_survives_unregister() {
        let router = Arc::new(DynamicRouter::default());
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let handle = router
            .register_group(&RouteGroup::new("/slow").route(
                HttpMethod::Get,
                "/",
                Arc::new(Gate(entered.clone(), release.clone())),
            ))
            .unwrap();

        let pending = tokio::spawn({
            let router = router.clone();
            async move { router.dispatch(request(Method::GET, "/slow", None)).await }
        });
        entered.notified().await;
        router.unregister(handle).unwrap();
        release.notify_one();

        let response = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, _) = call(&router, Method::GET, "/slow", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn module_response_headers_and_empty_bodies() {
        let response =
            into_axum_response(ModuleResponse::no_content().with_header("x-module", "items"));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["x-module"], "items");

        let response = into_axum_response(ModuleResponse::json(201, json!({ "id": 1 })));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/json");
    }
}
