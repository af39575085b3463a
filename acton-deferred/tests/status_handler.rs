//! Integration tests for the status-check endpoint and placeholder responses

use acton_deferred::bridge::ExecutionStatus;
use acton_deferred::error::DeferredError;
use acton_deferred::handlers::{self, StatusResponse};
use acton_deferred::jobs::{TaskDescriptor, WorkerManager};
use acton_deferred::resolution::{Resolution, TerminalPolicy};
use acton_deferred::store::MemoryStore;
use acton_deferred::testing::RecordingBridge;
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::{routing::get, Router};
use http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Helper to create a test app
fn test_app() -> (Router, MemoryStore, RecordingBridge) {
    let store = MemoryStore::new();
    let bridge = RecordingBridge::new();
    let manager = WorkerManager::new(Arc::new(store.clone()), Arc::new(bridge.clone()));

    let app = Router::new()
        .route("/", get(index))
        .with_state(manager.clone())
        .merge(handlers::status_routes(manager));
    (app, store, bridge)
}

async fn index(State(manager): State<WorkerManager>) -> Result<Resolution<String>, DeferredError> {
    let mut worker = manager
        .worker("index", TaskDescriptor::new("add").arg(2).arg(3))
        .await?;
    let resolution = worker.resolve(Some("/"), TerminalPolicy::Retain).await?;
    Ok(resolution.map(|result: Value| format!("result: {result}")))
}

async fn get_path(app: &Router, uri: &str) -> http::Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn status_of(app: &Router, tracking_id: &str) -> StatusResponse {
    let response = get_path(app, &format!("/_check_job_status?job_id={tracking_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_pending_page_then_result() {
    let (app, store, bridge) = test_app();

    let response = get_path(&app, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-trigger"], "job_pending");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("deferred-placeholder"));

    let tracking_id = bridge.last_submission().unwrap().tracking_id;
    let pending = status_of(&app, tracking_id.as_str()).await;
    assert_eq!(
        pending,
        StatusResponse {
            job_finished: false,
            status: ExecutionStatus::Pending,
        }
    );

    bridge.complete(&store, json!(5)).await;
    assert!(status_of(&app, tracking_id.as_str()).await.job_finished);

    let response = get_path(&app, "/").await;
    assert!(response.headers().get("hx-trigger").is_none());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"result: 5");
}

#[tokio::test]
async fn test_unknown_tracking_id_is_not_finished() {
    let (app, _store, _bridge) = test_app();
    let status = status_of(&app, "never-submitted").await;
    assert!(!status.job_finished);
    assert_eq!(status.status, ExecutionStatus::Unknown);
}

#[tokio::test]
async fn test_missing_job_id_is_bad_request() {
    let (app, _store, _bridge) = test_app();
    let response = get_path(&app, "/_check_job_status").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
