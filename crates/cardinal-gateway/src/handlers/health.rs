//! Health check endpoints
//!
//! GET /health                 - liveness probe
//! GET {admin_prefix}/health   - same payload, for dashboards polling the admin API

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;

use crate::state::AppState;

/// GET /health - liveness probe
///
/// Always returns 200 OK while the process is alive.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": state.config.app_name,
            "version": state.config.version,
        })),
    )
}

/// Build the health router sub-tree
pub fn health_router(admin_prefix: &str) -> axum::Router<Arc<AppState>> {
    let router = axum::Router::new().route("/health", get(health));
    if admin_prefix.is_empty() {
        router
    } else {
        router.route(&format!("{admin_prefix}/health"), get(health))
    }
}
