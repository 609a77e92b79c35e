//! Routes receiving producer events.

use axum::extract::State;
use axum::{Json, Router, routing::post};
use covflow_core::event::OrchestratedEvent;
use covflow_orchestration::application::command_handlers;
use covflow_orchestration::application::query_handlers::{self, AggregateStateView};
use covflow_orchestration::domain::codec::JsonStateChangeCodec;
use covflow_orchestration::domain::commands;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct RecordStateChangeRequest {
    /// Proposed state of an ingestion or job aggregate.
    pub event: OrchestratedEvent,
    /// Git ref the commit was pushed to.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Pull request the commit belongs to, if any.
    pub pull_request: Option<u64>,
}

/// Response body returned after a state change is handled.
#[derive(Debug, Serialize)]
pub struct RecordStateChangeResponse {
    /// The aggregate the change was recorded against.
    pub identifier: String,
    /// Version written, or `null` if the state was already current.
    pub version: Option<i64>,
    /// Append attempts made.
    pub attempts: u32,
    /// Finalised event published for the commit, if this change completed it.
    pub finalised: Option<OrchestratedEvent>,
}

/// POST /
#[instrument(
    skip(state, request),
    fields(identifier = %request.event.unique_identifier())
)]
async fn record_state_change(
    State(state): State<AppState>,
    Json(request): Json<RecordStateChangeRequest>,
) -> Result<Json<RecordStateChangeResponse>, ApiError> {
    let command = commands::RecordStateChange {
        correlation_id: Uuid::new_v4(),
        event: request.event,
        git_ref: request.git_ref,
        pull_request: request.pull_request,
    };

    info!(correlation_id = %command.correlation_id, "handling record_state_change command");

    let outcome = command_handlers::handle_record_state_change(
        &command,
        state.orchestration(&JsonStateChangeCodec),
    )
    .await?;

    Ok(Json(RecordStateChangeResponse {
        identifier: outcome.identifier,
        version: outcome.version,
        attempts: outcome.attempts,
        finalised: outcome.finalised,
    }))
}

/// POST /state
#[instrument(skip_all, fields(identifier = %event.unique_identifier()))]
async fn get_aggregate_state(
    State(state): State<AppState>,
    Json(event): Json<OrchestratedEvent>,
) -> Result<Json<AggregateStateView>, ApiError> {
    let view =
        query_handlers::get_aggregate_state(&event, &JsonStateChangeCodec, &*state.store).await?;
    Ok(Json(view))
}

/// Returns the router for producer events.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(record_state_change))
        .route("/state", post(get_aggregate_state))
}
