//! Routes exposing per-commit orchestration status.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use covflow_core::event::{Provider, repository_identifier};
use covflow_orchestration::application::query_handlers::{self, CommitStatusView};
use covflow_orchestration::domain::codec::JsonStateChangeCodec;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /{provider}/{owner}/{repository}/{commit}
#[instrument(skip(state))]
async fn get_commit_status(
    State(state): State<AppState>,
    Path((provider, owner, repository, commit)): Path<(String, String, String, String)>,
) -> Result<Json<CommitStatusView>, ApiError> {
    let provider: Provider = provider.parse()?;
    let status = query_handlers::get_commit_status(
        &repository_identifier(provider, &owner, &repository),
        &commit,
        &JsonStateChangeCodec,
        &*state.store,
    )
    .await?;
    Ok(Json(status))
}

/// Returns the router for commit status queries.
pub fn router() -> Router<AppState> {
    Router::new().route("/{provider}/{owner}/{repository}/{commit}", get(get_commit_status))
}
