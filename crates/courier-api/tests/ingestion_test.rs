//! Relay ingestion tests.
//!
//! Drives the router with `oneshot` requests and inspects what landed in
//! the request store.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use courier_api::{create_router, AppState};
use courier_delivery::EnqueueSignal;
use courier_testing::{FaultyStore, StoreOp, TestEnv};
use serde_json::Value;
use tower::ServiceExt;

fn router(env: &TestEnv, signal: EnqueueSignal) -> Router {
    let state = AppState::new(env.store_handle(), env.clock_handle(), signal);
    create_router(state, Duration::from_secs(10))
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Option<String>, Value) {
    let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.expect("failed to make request");

    let status = response.status();
    let request_id = response
        .headers()
        .get("X-Request-Id")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);

    (status, request_id, json)
}

#[tokio::test]
async fn any_request_is_queued_with_path_query_and_default_ttl() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let app = router(&env, EnqueueSignal::new());

    let (status, _, body) = send(app, "POST", "/orders/42?expand=items").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");

    let entries = env.entries().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.method, "POST");
    assert_eq!(entry.target_path, "/orders/42?expand=items");
    assert_eq!(entry.ttl, courier_core::DEFAULT_TTL);
    assert!(!entry.scheduled);
    assert_eq!(body["entry_id"], entry.id.to_string());
}

#[tokio::test]
async fn configured_ttl_is_applied() {
    let env = TestEnv::new().await.unwrap();
    let state = AppState::new(env.store_handle(), env.clock_handle(), EnqueueSignal::new())
        .with_default_ttl(7);
    let app = create_router(state, Duration::from_secs(10));

    let (status, _, _) = send(app, "DELETE", "/sessions/abc").await;

    assert_eq!(status, StatusCode::OK);
    let entries = env.entries().unwrap();
    assert_eq!(entries[0].ttl, 7);
    assert_eq!(entries[0].method, "DELETE");
}

#[tokio::test]
async fn entry_is_due_at_ingest_time() {
    let env = TestEnv::new().await.unwrap();
    let app = router(&env, EnqueueSignal::new());

    let (status, _, _) = send(app, "GET", "/").await;

    assert_eq!(status, StatusCode::OK);
    let entry = &env.entries().unwrap()[0];
    assert_eq!(entry.target_path, "/");
    assert_eq!(entry.delivery_time, courier_core::Clock::now_nanos(&env.clock));
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let env = TestEnv::new().await.unwrap();

    let (_, first, _) = send(router(&env, EnqueueSignal::new()), "GET", "/a").await;
    let (_, second, _) = send(router(&env, EnqueueSignal::new()), "GET", "/_courier/live").await;

    let first = first.expect("relay response should carry X-Request-Id");
    let second = second.expect("service response should carry X-Request-Id");
    assert_ne!(first, second);
}

#[tokio::test]
async fn enqueue_raises_the_signal() {
    let env = TestEnv::new().await.unwrap();
    let signal = EnqueueSignal::new();

    let (status, _, _) = send(router(&env, signal.clone()), "PUT", "/x").await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::timeout(Duration::from_millis(100), signal.notified())
        .await
        .expect("ingest should wake the scheduler");
}

#[tokio::test]
async fn storage_failure_returns_500_and_stores_nothing() {
    let env = TestEnv::new().await.unwrap();
    let faulty = Arc::new(FaultyStore::new(env.store_handle()));
    faulty.fail_always(StoreOp::Put);

    let state = AppState::new(faulty.clone(), env.clock_handle(), EnqueueSignal::new());
    let app = create_router(state, Duration::from_secs(10));

    let (status, request_id, body) = send(app, "POST", "/hook").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(request_id.is_some());
    assert_eq!(body["error"]["code"], "storage_failure");
    assert!(body["error"]["message"].is_string());
    assert_eq!(faulty.failure_count(StoreOp::Put), 1);
    assert!(env.entries().unwrap().is_empty());
}

#[tokio::test]
async fn service_prefix_does_not_swallow_other_paths() {
    let env = TestEnv::new().await.unwrap();

    let (status, _, _) = send(router(&env, EnqueueSignal::new()), "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(env.entries().unwrap()[0].target_path, "/health");
}
