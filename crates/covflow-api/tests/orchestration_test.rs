//! End-to-end tests of the commit orchestration flow over HTTP.

mod common;

use axum::http::StatusCode;
use covflow_core::event::OrchestratedEvent;
use serde_json::json;

const COMMIT_URI: &str = "/api/v1/commits/github/mock-owner/mock-repository/mock-commit";

#[tokio::test]
async fn test_commit_is_finalised_once_every_aggregate_is_terminal() {
    let harness = common::TestHarness::new();

    // Two aggregates start work on the commit.
    for event in [common::ingestion("ONGOING"), common::job("build", "ONGOING")] {
        let (status, _) =
            common::post_json(harness.app(), "/api/v1/events", &common::record(event)).await;
        assert_eq!(status, StatusCode::OK);
    }

    // The ingestion finishes while the job is still running.
    let (status, json) = common::post_json(
        harness.app(),
        "/api/v1/events",
        &common::record(common::ingestion("SUCCESS")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], 1);
    assert!(json["finalised"].is_null());
    assert!(harness.bus.published_events().is_empty());

    // The job fails, which completes the commit.
    let (status, json) = common::post_json(
        harness.app(),
        "/api/v1/events",
        &common::record(common::job("build", "FAILURE")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["finalised"]["type"], "FINALISED");
    assert_eq!(json["finalised"]["commit"], "mock-commit");

    let published = harness.bus.published_events();
    assert_eq!(published.len(), 1);
    assert!(matches!(published[0], OrchestratedEvent::Finalised(_)));

    // The commit view agrees.
    let (status, json) = common::get_json(harness.app(), COMMIT_URI).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["complete"], true);
    assert_eq!(json["aggregates"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_repeated_state_is_not_appended_again() {
    let harness = common::TestHarness::new();
    let body = common::record(common::ingestion("ONGOING"));

    common::post_json(harness.app(), "/api/v1/events", &body).await;
    let (status, json) = common::post_json(harness.app(), "/api/v1/events", &body).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["version"].is_null());
    assert_eq!(harness.store.rows().len(), 1);
}

#[tokio::test]
async fn test_only_changed_fields_are_stored_after_first_version() {
    let harness = common::TestHarness::new();

    common::post_json(
        harness.app(),
        "/api/v1/events",
        &common::record(common::job("build", "ONGOING")),
    )
    .await;
    common::post_json(
        harness.app(),
        "/api/v1/events",
        &common::record(common::job("build", "SUCCESS")),
    )
    .await;

    let rows = harness.store.rows();
    let latest = rows.iter().find(|row| row.version == 1).unwrap();
    assert_eq!(serde_json::Value::Object(latest.event.clone()), json!({ "state": "SUCCESS" }));
}

#[tokio::test]
async fn test_aggregate_state_query_returns_recorded_event() {
    let harness = common::TestHarness::new();
    common::post_json(
        harness.app(),
        "/api/v1/events",
        &common::record(common::ingestion("ONGOING")),
    )
    .await;

    let (status, json) =
        common::post_json(harness.app(), "/api/v1/events/state", &common::ingestion("ONGOING"))
            .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["identifier"],
        "INGESTION#github#mock-owner#mock-repository#mock-commit"
    );
    assert_eq!(json["event"]["type"], "INGESTION");
}
