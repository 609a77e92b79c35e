//! Query handlers for commit orchestration.
//!
//! This module folds stored state changes into read-only views of single
//! aggregates and of whole commits.

use std::sync::Arc;

use covflow_core::error::DomainError;
use covflow_core::event::OrchestratedEvent;
use covflow_core::repository::StateChangeStore;
use covflow_core::state_change::EventStateChangeCollection;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::codec::StateChangeCodec;

/// Read-only view of one folded aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateStateView {
    /// Unique identifier of the aggregate.
    pub identifier: String,
    /// Highest version folded into `event`.
    pub version: i64,
    /// The aggregate's current state.
    pub event: OrchestratedEvent,
}

impl AggregateStateView {
    fn fold(
        identifier: String,
        changes: &Arc<EventStateChangeCollection>,
        codec: &dyn StateChangeCodec,
    ) -> Result<Self, DomainError> {
        let Some(version) = changes.latest_version() else {
            return Err(DomainError::AggregateNotFound(identifier));
        };
        let event = codec.reduce_state_changes_to_event(changes)?;
        Ok(Self {
            identifier,
            version,
            event,
        })
    }
}

/// Read-only view of every aggregate tracked for one commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitStatusView {
    /// Provider, owner and repository combined.
    pub repository_identifier: String,
    /// Commit SHA.
    pub commit: String,
    /// Every tracked aggregate, ordered by identifier.
    pub aggregates: Vec<AggregateStateView>,
    /// `true` once at least one aggregate is tracked and all are terminal.
    pub complete: bool,
}

/// Retrieves the current state of the aggregate `event` belongs to.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no state changes exist.
/// Returns `DomainError::CorruptEventSource` or `DomainError::UnknownEventType`
/// if the stored changes do not fold into a valid event.
#[instrument(skip_all, fields(identifier = %event.unique_identifier()))]
pub async fn get_aggregate_state(
    event: &OrchestratedEvent,
    codec: &dyn StateChangeCodec,
    store: &dyn StateChangeStore,
) -> Result<AggregateStateView, DomainError> {
    let changes = store.get_state_changes_for_event(event).await?;
    AggregateStateView::fold(event.unique_identifier(), &Arc::new(changes), codec)
}

/// Retrieves the folded state of every aggregate tracked for a commit.
///
/// # Errors
///
/// Returns `DomainError::CorruptEventSource` or `DomainError::UnknownEventType`
/// if any aggregate's changes do not fold into a valid event.
#[instrument(skip(codec, store))]
pub async fn get_commit_status(
    repository_identifier: &str,
    commit: &str,
    codec: &dyn StateChangeCodec,
    store: &dyn StateChangeStore,
) -> Result<CommitStatusView, DomainError> {
    let grouped = store
        .get_event_state_changes_for_commit(repository_identifier, commit)
        .await?;

    let aggregates = grouped
        .into_iter()
        .map(|(identifier, changes)| {
            AggregateStateView::fold(identifier, &Arc::new(changes), codec)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let complete = !aggregates.is_empty()
        && aggregates
            .iter()
            .all(|aggregate| aggregate.event.state().is_terminal());
    debug!(aggregates = aggregates.len(), complete, "folded commit");

    Ok(CommitStatusView {
        repository_identifier: repository_identifier.to_owned(),
        commit: commit.to_owned(),
        aggregates,
        complete,
    })
}
