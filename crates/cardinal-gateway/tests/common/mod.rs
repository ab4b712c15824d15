#![allow(dead_code)]

use std::path::{Path, PathBuf};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use cardinal_gateway::{CardinalConfig, CardinalServer};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BILLING: &str = r#"
fn invoice(req) { #{ invoice: 1 } }
let router = router("/billing");
router.get("/invoice", "invoice");
"#;

pub const BILLING_V2: &str = r#"
fn invoice(req) { #{ invoice: 2 } }
fn refund(req) { #{ status: 201, body: #{ refunded: req.body.amount } } }
let router = router("/billing");
router.get("/invoice", "invoice");
router.post("/refund", "refund");
"#;

/// A server over a temporary modules root, watcher disabled.
pub struct TestHost {
    pub tmp: TempDir,
    pub server: CardinalServer,
    pub app: Router,
}

impl TestHost {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let server = server_for(tmp.path().join("modules"));
        let app = server.app();
        Self { tmp, server, app }
    }

    pub fn root(&self) -> PathBuf {
        self.tmp.path().join("modules")
    }

    pub fn write(&self, module: &str, file: &str, body: &str) {
        let dir = self.root().join(module);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), body).unwrap();
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        send(&self.app, method, uri, body).await
    }
}

pub fn server_for(modules_path: impl AsRef<Path>) -> CardinalServer {
    let config = CardinalConfig {
        modules_path: modules_path.as_ref().to_path_buf(),
        auto_reload: false,
        ..Default::default()
    };
    CardinalServer::new(config).unwrap()
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
