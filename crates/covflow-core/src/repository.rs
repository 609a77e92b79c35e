//! State-change store abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::OrchestratedEvent;
use crate::state_change::{
    CommitStateChanges, EventStateChange, EventStateChangeCollection, StateChange,
};

/// Result of a conditional append.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// The change was written at the requested version.
    Stored,
    /// Another writer already owns the requested version.
    Conflict {
        /// The row previously written at that version.
        existing: Box<EventStateChange>,
    },
}

impl StoreOutcome {
    /// Returns `true` if the change was written.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Append-only, versioned log of aggregate state changes.
///
/// Version numbers are the only serialization point between writers: an
/// append succeeds only if no row exists yet at `(identifier, version)`.
#[async_trait]
pub trait StateChangeStore: Send + Sync {
    /// Append `change` as version `version` of the aggregate `event` belongs
    /// to. A row already present at that version yields
    /// [`StoreOutcome::Conflict`] rather than an error.
    async fn store_state_change(
        &self,
        event: &OrchestratedEvent,
        version: i64,
        change: &StateChange,
    ) -> Result<StoreOutcome, DomainError>;

    /// Load every live change for the aggregate `event` belongs to, ordered by
    /// version.
    async fn get_state_changes_for_event(
        &self,
        event: &OrchestratedEvent,
    ) -> Result<EventStateChangeCollection, DomainError>;

    /// Load every live change of every aggregate sharing a repository and
    /// commit, grouped by aggregate identifier.
    async fn get_event_state_changes_for_commit(
        &self,
        repository_identifier: &str,
        commit: &str,
    ) -> Result<CommitStateChanges, DomainError>;
}
