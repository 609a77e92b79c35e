//! Command handlers for commit orchestration.
//!
//! This module contains the decision loop run for every producer event: fold
//! the aggregate's log, append the diff at the next free version (retrying on
//! conflict), and publish a finalised event once the whole commit is done.

use std::sync::Arc;

use covflow_core::bus::EventBus;
use covflow_core::clock::Clock;
use covflow_core::command::Command;
use covflow_core::error::DomainError;
use covflow_core::event::{Finalised, FinalisedState, OrchestratedEvent};
use covflow_core::repository::{StateChangeStore, StoreOutcome};
use tracing::{debug, info, instrument, warn};

use crate::application::query_handlers;
use crate::domain::codec::StateChangeCodec;
use crate::domain::commands::RecordStateChange;

/// Number of append attempts made before giving up on a contended aggregate.
pub const DEFAULT_CONFLICT_RETRY_LIMIT: u32 = 5;

/// Result of a successfully handled `RecordStateChange` command.
#[derive(Debug)]
pub struct RecordOutcome {
    /// The aggregate the change was recorded against.
    pub identifier: String,
    /// Version written, or `None` if the state was already current.
    pub version: Option<i64>,
    /// Append attempts made, including the successful one.
    pub attempts: u32,
    /// The finalised event published for the commit, if this change
    /// completed it.
    pub finalised: Option<OrchestratedEvent>,
}

/// Collaborators the decision loop runs against.
#[derive(Clone, Copy)]
pub struct Orchestration<'a> {
    /// Diff and fold implementation.
    pub codec: &'a dyn StateChangeCodec,
    /// Append-only state-change log.
    pub store: &'a dyn StateChangeStore,
    /// Destination of finalised events.
    pub bus: &'a dyn EventBus,
    /// Source of event times.
    pub clock: &'a dyn Clock,
    /// Append attempts allowed before reporting exhaustion.
    pub max_attempts: u32,
}

/// Handles the `RecordStateChange` command: appends the diff between the
/// aggregate's last known state and the proposed one, then publishes a
/// finalised event if every aggregate of the commit has become terminal.
///
/// # Errors
///
/// Returns `DomainError::Validation` for finalised events, which are produced
/// here and never tracked.
/// Returns `DomainError::ConflictRetriesExhausted` if every attempt lost the
/// race for the next version.
/// Returns `DomainError` if loading, folding, appending or publishing fails.
#[instrument(
    skip_all,
    fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        identifier = %command.event.unique_identifier(),
    )
)]
pub async fn handle_record_state_change(
    command: &RecordStateChange,
    orchestration: Orchestration<'_>,
) -> Result<RecordOutcome, DomainError> {
    if matches!(command.event, OrchestratedEvent::Finalised(_)) {
        return Err(DomainError::Validation(
            "finalised events are published, not recorded".to_owned(),
        ));
    }

    let (version, attempts) = append_next_version(&command.event, orchestration).await?;

    let finalised = match version {
        Some(_) if command.event.state().is_terminal() => {
            finalise_commit_if_complete(command, orchestration).await?
        }
        _ => None,
    };

    Ok(RecordOutcome {
        identifier: command.event.unique_identifier(),
        version,
        attempts,
        finalised,
    })
}

/// Appends the diff for `event` at the version after the latest one stored,
/// re-reading and retrying whenever another writer claims that version first.
async fn append_next_version(
    event: &OrchestratedEvent,
    orchestration: Orchestration<'_>,
) -> Result<(Option<i64>, u32), DomainError> {
    let Orchestration {
        codec,
        store,
        max_attempts,
        ..
    } = orchestration;

    for attempt in 1..=max_attempts {
        let history = Arc::new(store.get_state_changes_for_event(event).await?);
        let current = if history.is_empty() {
            None
        } else {
            Some(codec.reduce_state_changes_to_event(&history)?)
        };

        let change = codec.get_state_change(current.as_ref(), event)?;
        if current.is_some() && change.is_empty() {
            debug!(attempt, "state unchanged, nothing to append");
            return Ok((None, attempt));
        }

        let version = history.next_version();
        match store.store_state_change(event, version, &change).await? {
            StoreOutcome::Stored => {
                info!(version, attempt, fields = change.len(), "appended state change");
                return Ok((Some(version), attempt));
            }
            StoreOutcome::Conflict { existing } => {
                warn!(
                    version,
                    attempt,
                    existing_event_time = %existing.event_time,
                    "version already taken, re-reading state"
                );
            }
        }
    }

    Err(DomainError::ConflictRetriesExhausted {
        identifier: event.unique_identifier(),
        attempts: max_attempts,
    })
}

/// Publishes a finalised event for the command's commit if every tracked
/// aggregate of that commit is terminal.
///
/// # Errors
///
/// Returns `DomainError` if folding the commit or publishing fails.
pub async fn finalise_commit_if_complete(
    command: &RecordStateChange,
    orchestration: Orchestration<'_>,
) -> Result<Option<OrchestratedEvent>, DomainError> {
    let source = &command.event;
    let status = query_handlers::get_commit_status(
        &source.unique_repository_identifier(),
        source.commit(),
        orchestration.codec,
        orchestration.store,
    )
    .await?;

    if !status.complete {
        debug!(
            aggregates = status.aggregates.len(),
            "commit still has work in flight"
        );
        return Ok(None);
    }

    let finalised = OrchestratedEvent::Finalised(Finalised {
        provider: source.provider(),
        owner: source.owner().to_owned(),
        repository: source.repository().to_owned(),
        commit: source.commit().to_owned(),
        state: FinalisedState,
        git_ref: command.git_ref.clone(),
        pull_request: command.pull_request,
        event_time: orchestration.clock.now(),
    });
    orchestration.bus.publish(&finalised).await?;

    info!(
        commit = source.commit(),
        aggregates = status.aggregates.len(),
        "published finalised event"
    );
    Ok(Some(finalised))
}
