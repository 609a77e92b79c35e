//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use covflow_api::state::AppState;
use covflow_test_support::{FixedClock, InMemoryStateChangeStore, RecordingEventBus};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Collaborators behind a test app, kept so tests can inspect them.
pub struct TestHarness {
    pub store: Arc<InMemoryStateChangeStore>,
    pub bus: Arc<RecordingEventBus>,
    state: AppState,
}

impl TestHarness {
    /// Builds a harness with an empty in-memory store and a recording bus.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStateChangeStore::default());
        let bus = Arc::new(RecordingEventBus::new());
        let state = AppState::new(
            Arc::new(FixedClock::default()),
            store.clone(),
            bus.clone(),
            5,
        );
        Self { store, bus, state }
    }

    /// Builds the full app router exactly as the server does.
    pub fn app(&self) -> Router {
        covflow_api::app(self.state.clone())
    }
}

/// Builds a producer event body for the shared mock commit.
pub fn ingestion(state: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "INGESTION",
        "provider": "github",
        "owner": "mock-owner",
        "repository": "mock-repository",
        "commit": "mock-commit",
        "state": state,
    })
}

/// Builds a job event body for the shared mock commit.
pub fn job(external_id: &str, state: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "JOB",
        "provider": "github",
        "owner": "mock-owner",
        "repository": "mock-repository",
        "commit": "mock-commit",
        "state": state,
        "externalId": external_id,
    })
}

/// Wraps `event` in a record request on `refs/heads/main`.
pub fn record(event: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "event": event, "ref": "refs/heads/main" })
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
