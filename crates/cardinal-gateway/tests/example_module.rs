mod common;

use std::path::PathBuf;

use axum::Router;
use axum::http::{Method, StatusCode};
use cardinal_gateway::CardinalServer;
use common::{send, server_for};
use serde_json::json;

fn sample_modules() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../modules")
}

async fn start() -> (CardinalServer, Router) {
    let server = server_for(sample_modules());
    let report = server.start_modules().await.unwrap();
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    let app = server.app();
    (server, app)
}

#[tokio::test]
async fn sample_module_is_introspectable() {
    let (_server, app) = start().await;

    let (status, body) = send(&app, Method::GET, "/api/modules/example_module", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prefix"], "/items");
    assert_eq!(body["route_count"], 5);
    assert_eq!(body["description"], "Example CRUD module managing items");
}

#[tokio::test]
async fn items_are_seeded_and_paginated() {
    let (_server, app) = start().await;

    let (status, body) = send(&app, Method::GET, "/items", None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], 1);
    assert_eq!(items[0]["name"], "Example Item 1");
    assert_eq!(items[1]["price"], 29.99);
    assert!(items[0]["updated_at"].is_null());

    let (_, body) = send(&app, Method::GET, "/items?skip=1&limit=1", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], 2);

    let (status, body) = send(&app, Method::GET, "/items?limit=abc", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "limit must be an integer");
}

#[tokio::test]
async fn item_crud_round() {
    let (_server, app) = start().await;

    let (status, created) = send(
        &app,
        Method::POST,
        "/items",
        Some(json!({ "name": "Widget", "price": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 3);
    assert_eq!(created["is_active"], true);
    assert!(created["created_at"].is_string());

    let (status, fetched) = send(&app, Method::GET, "/items/3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Widget");

    let (status, updated) = send(
        &app,
        Method::PUT,
        "/items/3",
        Some(json!({ "price": 7.5, "is_active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], 7.5);
    assert_eq!(updated["is_active"], false);
    assert_eq!(updated["name"], "Widget");
    assert!(updated["updated_at"].is_string());

    let (status, body) = send(&app, Method::DELETE, "/items/3", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, body) = send(&app, Method::GET, "/items/3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Item not found" }));

    let (status, _) = send(&app, Method::DELETE, "/items/3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_item_input_is_rejected() {
    let (_server, app) = start().await;

    let (status, body) = send(&app, Method::POST, "/items", Some(json!({ "price": 1 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "name must be a string");

    let (status, body) = send(
        &app,
        Method::POST,
        "/items",
        Some(json!({ "name": "x", "price": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "price must be a number >= 0");

    let (status, _) = send(&app, Method::GET, "/items/abc", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, Method::PUT, "/items/99", Some(json!({ "name": "y" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn state_resets_after_reload() {
    let (_server, app) = start().await;

    send(&app, Method::DELETE, "/items/1", None).await;
    let (_, body) = send(&app, Method::GET, "/items", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::POST, "/api/modules/example_module/reload", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, "/items", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}
