//! Integration tests for the HTTP bridge
//!
//! No runtime socket is attached here, so the runtime is never acquired and
//! only effects and status are observable.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use avatar_sync::config::SyncConfig;
use avatar_sync::core::{create_router, AppState, MemoryStore};

fn create_test_router() -> Router {
    let state = AppState::new(SyncConfig::default(), Box::new(MemoryStore::new()));
    create_router(Arc::new(state))
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router();
    let (status, json) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_status_starts_disconnected() {
    let app = create_test_router();
    let (status, json) = get_json(&app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["readiness"]["connection_status"], "disconnected");
    assert_eq!(json["readiness"]["instance_acquired"], false);
    assert_eq!(json["introduction"], "pending");
    assert_eq!(json["emotion"]["emotion"], "neutral");
    assert_eq!(json["fully_ready"], false);
}

#[tokio::test]
async fn test_server_response_returns_effects() {
    let app = create_test_router();
    let (status, json) = post_json(
        &app,
        "/events/server",
        r#"{"event": "response", "data": {"message": "Hello there", "emotion": "happy"}}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let effects = json["effects"].as_array().unwrap();
    assert!(effects.iter().any(|e| {
        e["target"] == "ui" && e["notice"]["notice"] == "message" && e["notice"]["text"] == "Hello there"
    }));

    // A response implies the socket is up
    let (_, status_json) = get_json(&app, "/status").await;
    assert_eq!(status_json["readiness"]["connection_status"], "connected");
}

#[tokio::test]
async fn test_malformed_server_event_rejected() {
    let app = create_test_router();
    let (status, _) = post_json(&app, "/events/server", r#"{"event": "nonsense"}"#).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_unknown_frame_message_is_unprocessable() {
    let app = create_test_router();
    let (status, _) = post_json(&app, "/events/runtime", r#"{"type": "resize"}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_runtime_frame_message_accepted() {
    let app = create_test_router();
    let (status, json) = post_json(
        &app,
        "/events/runtime",
        r#"{"type": "runtime-fully-initialized"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["effects"].is_array());
}

#[tokio::test]
async fn test_callback_and_custom_event_routes() {
    let app = create_test_router();
    let (status, _) = post_json(
        &app,
        "/events/callback",
        r#"{"name": "motion-changed", "argument": "idle"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post_json(&app, "/events/callback", r#"{"name": "resize"}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = post_json(&app, "/events/custom", r#"{"name": "StartMotionCompleted"}"#).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post_json(&app, "/events/custom", r#"{"name": "Resize"}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_connection_and_audio_ready() {
    let app = create_test_router();
    let (status, _) = post_json(&app, "/connection", r#"{"status": "connected"}"#).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post_json(&app, "/audio/ready", "{}").await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = get_json(&app, "/status").await;
    assert_eq!(json["readiness"]["connection_status"], "connected");
    assert_eq!(json["audio_initialized"], true);
}

#[tokio::test]
async fn test_introduction_reset_returns_no_content() {
    let app = create_test_router();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/introduction/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_effects_drained_once() {
    let app = create_test_router();
    post_json(
        &app,
        "/events/server",
        r#"{"event": "error", "data": {"message": "backend down"}}"#,
    )
    .await;

    // Handler already drained the error notice
    let (status, json) = get_json(&app, "/effects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}
