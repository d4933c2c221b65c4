//! Router tests: webhook ingress and health endpoints through the full middleware stack.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use lc_test_utils::TestHarness;
use lifecycle_service::observability::HealthState;
use lifecycle_service::routes::{build_routes, AppState};
use std::sync::Arc;
use tower::util::ServiceExt;

fn app(harness: &TestHarness, health: Arc<HealthState>) -> Router {
    let state = Arc::new(AppState {
        dispatcher: Arc::clone(&harness.dispatcher),
    });
    build_routes(state, health, None)
}

fn post_webhook(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/webhook+json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

#[tokio::test]
async fn test_webhook_accepts_event() {
    let harness = TestHarness::new();
    let app = app(&harness, Arc::new(HealthState::new()));

    let body = r#"{
        "event": "room_started",
        "id": "EV_1",
        "createdAt": "1706000000",
        "room": {"sid": "RM_1", "name": "standup", "creationTime": "1706000000", "metadata": ""}
    }"#;
    let response = app.oneshot(post_webhook(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Synchronous portion is done once the response is returned
    let record = harness.store.get("standup").unwrap();
    assert!(record.is_running);
    assert_eq!(record.session_id.as_str(), "RM_1");

    harness.settle().await;
    assert_eq!(harness.webhook.delivered().len(), 1);
}

#[tokio::test]
async fn test_webhook_rejects_malformed_body() {
    let harness = TestHarness::new();
    let app = app(&harness, Arc::new(HealthState::new()));

    let response = app.oneshot(post_webhook("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    harness.settle().await;
    assert!(harness.webhook.delivered().is_empty());
}

#[tokio::test]
async fn test_webhook_accepts_unknown_kind() {
    let harness = TestHarness::new();
    let app = app(&harness, Arc::new(HealthState::new()));

    let body = r#"{"event": "egress_ended", "room": {"sid": "RM_1", "name": "standup"}}"#;
    let response = app.oneshot(post_webhook(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_webhook_accepts_event_without_room() {
    let harness = TestHarness::new();
    let app = app(&harness, Arc::new(HealthState::new()));

    let body = r#"{"event": "room_finished", "id": "EV_2"}"#;
    let response = app.oneshot(post_webhook(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    harness.settle().await;
    assert!(harness.recorder.commands().is_empty());
}

#[tokio::test]
async fn test_webhook_requires_post() {
    let harness = TestHarness::new();
    let app = app(&harness, Arc::new(HealthState::new()));

    let request = Request::builder()
        .uri("/webhook")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_health_endpoints_are_served() {
    let harness = TestHarness::new();
    let health = Arc::new(HealthState::new());
    let app = app(&harness, Arc::clone(&health));

    let live = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    let not_ready = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);

    health.set_ready();
    let ready = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_route_absent_without_handle() {
    let harness = TestHarness::new();
    let app = app(&harness, Arc::new(HealthState::new()));

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
