//! Module introspection and administration endpoints
//!
//! GET    {admin}/modules               - every loaded module
//! GET    {admin}/modules/{name}        - one module
//! POST   {admin}/modules/{name}/reload - load or reload from disk
//! DELETE {admin}/modules/{name}        - unload
//! POST   {admin}/modules/rescan        - load every module under the root

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

/// GET {admin}/modules
///
/// `failures` maps each module whose latest load attempt failed to its error,
/// including modules that never loaded.
pub async fn list_modules(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let modules = state.manager.introspect().await;
    let total = modules.len();
    let failures: BTreeMap<String, String> = state.manager.failures().into_iter().collect();
    Json(json!({ "modules": modules, "total": total, "failures": failures }))
}

/// GET {admin}/modules/{name}
pub async fn get_module(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    let summary = state
        .manager
        .module_summary(&name)
        .await
        .ok_or(GatewayError::ModuleNotFound(name))?;
    Ok(Json(summary))
}

/// POST {admin}/modules/{name}/reload
///
/// Answers with the fresh summary, or 422 carrying the load failure. A failed
/// reload leaves the previously loaded version serving.
pub async fn reload_module(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    info!(module = %name, "Reload requested");
    state.manager.load(&name).await?;
    let summary = state
        .manager
        .module_summary(&name)
        .await
        .ok_or_else(|| GatewayError::Internal(format!("module '{name}' vanished after reload")))?;
    Ok(Json(summary))
}

/// DELETE {admin}/modules/{name}
pub async fn unload_module(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> GatewayResult<StatusCode> {
    info!(module = %name, "Unload requested");
    state.manager.unload(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST {admin}/modules/rescan
pub async fn rescan_modules(
    State(state): State<Arc<AppState>>,
) -> GatewayResult<impl IntoResponse> {
    let report = state.manager.load_all().await?;
    Ok(Json(report))
}

/// Build the module admin router sub-tree under `admin_prefix`
pub fn modules_router(admin_prefix: &str) -> axum::Router<Arc<AppState>> {
    let base = format!("{admin_prefix}/modules");
    axum::Router::new()
        .route(&base, get(list_modules))
        .route(&format!("{base}/rescan"), post(rescan_modules))
        .route(
            &format!("{base}/{{name}}"),
            get(get_module).delete(unload_module),
        )
        .route(&format!("{base}/{{name}}/reload"), post(reload_module))
}
