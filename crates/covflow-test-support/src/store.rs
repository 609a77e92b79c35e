//! Test stores: in-memory `StateChangeStore` implementations for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use covflow_core::clock::Clock;
use covflow_core::error::DomainError;
use covflow_core::event::OrchestratedEvent;
use covflow_core::repository::{StateChangeStore, StoreOutcome};
use covflow_core::state_change::{
    CommitStateChanges, EventStateChange, EventStateChangeCollection, StateChange,
};

use crate::clock::FixedClock;

/// A state-change store held in memory with the same conditional-append
/// semantics as the PostgreSQL store.
///
/// Rows are keyed by `(identifier, version)`; the check and insert of an
/// append happen under one lock, so concurrent appends to the same version
/// produce exactly one winner. Rows past their expiry are invisible to reads
/// and an append at their version replaces them.
///
/// Competing writes queued with [`InMemoryStateChangeStore::race_next_append`]
/// are written just before the next append, at the version that append
/// targets, to simulate losing a race against another producer.
pub struct InMemoryStateChangeStore {
    rows: Mutex<BTreeMap<(String, i64), EventStateChange>>,
    competing_writes: Mutex<VecDeque<(OrchestratedEvent, StateChange)>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryStateChangeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStateChangeStore")
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryStateChangeStore {
    fn default() -> Self {
        Self::new(Arc::new(FixedClock::default()))
    }
}

impl InMemoryStateChangeStore {
    /// Creates an empty store stamping rows with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            competing_writes: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    /// Writes a row directly, bypassing the version check. Useful for seeding
    /// damaged or expired logs.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, change: EventStateChange) {
        self.rows
            .lock()
            .unwrap()
            .insert((change.identifier.clone(), change.version), change);
    }

    /// Queues a write by another producer that lands right before the next
    /// append, at the version that append targets.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn race_next_append(&self, event: OrchestratedEvent, change: StateChange) {
        self.competing_writes
            .lock()
            .unwrap()
            .push_back((event, change));
    }

    /// Returns every stored row, live or expired.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn rows(&self) -> Vec<EventStateChange> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    /// Deletes expired rows and returns how many were removed.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, row| !row.is_expired(now));
        before - rows.len()
    }

    fn live_rows<F>(&self, filter: F) -> Vec<EventStateChange>
    where
        F: Fn(&EventStateChange) -> bool,
    {
        let now = self.clock.now();
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| !row.is_expired(now) && filter(row))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StateChangeStore for InMemoryStateChangeStore {
    async fn store_state_change(
        &self,
        event: &OrchestratedEvent,
        version: i64,
        change: &StateChange,
    ) -> Result<StoreOutcome, DomainError> {
        let competing = self.competing_writes.lock().unwrap().pop_front();
        let now = self.clock.now();
        let mut rows = self.rows.lock().unwrap();

        if let Some((competing_event, competing_change)) = competing {
            let row = EventStateChange::new(&competing_event, version, competing_change, now);
            rows.insert((row.identifier.clone(), version), row);
        }

        let key = (event.unique_identifier(), version);
        if let Some(existing) = rows.get(&key).filter(|row| !row.is_expired(now)) {
            return Ok(StoreOutcome::Conflict {
                existing: Box::new(existing.clone()),
            });
        }

        rows.insert(key, EventStateChange::new(event, version, change.clone(), now));
        Ok(StoreOutcome::Stored)
    }

    async fn get_state_changes_for_event(
        &self,
        event: &OrchestratedEvent,
    ) -> Result<EventStateChangeCollection, DomainError> {
        let identifier = event.unique_identifier();
        Ok(self
            .live_rows(|row| row.identifier == identifier)
            .into_iter()
            .collect())
    }

    async fn get_event_state_changes_for_commit(
        &self,
        repository_identifier: &str,
        commit: &str,
    ) -> Result<CommitStateChanges, DomainError> {
        let rows = self.live_rows(|row| {
            row.repository_identifier == repository_identifier && row.commit == commit
        });
        Ok(EventStateChangeCollection::group_by_identifier(rows))
    }
}

/// A state-change store that always returns an infrastructure error. Useful
/// for testing error-handling paths.
#[derive(Debug)]
pub struct FailingStateChangeStore;

#[async_trait]
impl StateChangeStore for FailingStateChangeStore {
    async fn store_state_change(
        &self,
        _event: &OrchestratedEvent,
        _version: i64,
        _change: &StateChange,
    ) -> Result<StoreOutcome, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn get_state_changes_for_event(
        &self,
        _event: &OrchestratedEvent,
    ) -> Result<EventStateChangeCollection, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn get_event_state_changes_for_commit(
        &self,
        _repository_identifier: &str,
        _commit: &str,
    ) -> Result<CommitStateChanges, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use covflow_core::event::{Ingestion, OrchestratedEventState, Provider};
    use serde_json::json;

    use super::*;
    use crate::clock::fixed_now;

    fn ingestion(commit: &str) -> OrchestratedEvent {
        OrchestratedEvent::Ingestion(Ingestion {
            provider: Provider::Github,
            owner: "mock-owner".to_owned(),
            repository: "mock-repository".to_owned(),
            commit: commit.to_owned(),
            state: OrchestratedEventState::Ongoing,
        })
    }

    fn change(state: &str) -> StateChange {
        let mut fields = StateChange::new();
        fields.insert("state".to_owned(), json!(state));
        fields
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_same_version_have_one_winner() {
        // Arrange
        let store = Arc::new(InMemoryStateChangeStore::default());
        let event = ingestion("mock-commit");

        // Act
        let first = {
            let store = Arc::clone(&store);
            let event = event.clone();
            tokio::spawn(async move {
                store
                    .store_state_change(&event, 0, &change("SUCCESS"))
                    .await
            })
        };
        let second = {
            let store = Arc::clone(&store);
            let event = event.clone();
            tokio::spawn(async move {
                store
                    .store_state_change(&event, 0, &change("FAILURE"))
                    .await
            })
        };
        let outcomes = [
            first.await.unwrap().unwrap(),
            second.await.unwrap().unwrap(),
        ];

        // Assert
        let stored = outcomes.iter().filter(|o| o.is_stored()).count();
        assert_eq!(stored, 1);
        let winner = store.rows().pop().unwrap();
        let conflict = outcomes.iter().find(|o| !o.is_stored()).unwrap();
        match conflict {
            StoreOutcome::Conflict { existing } => assert_eq!(**existing, winner),
            StoreOutcome::Stored => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_expired_rows_are_invisible_and_purged() {
        // Arrange
        let store = InMemoryStateChangeStore::default();
        let event = ingestion("mock-commit");
        let stale_time = fixed_now() - TimeDelta::hours(13);
        store.seed(EventStateChange::new(&event, 0, change("ONGOING"), stale_time));
        store
            .store_state_change(&event, 1, &change("SUCCESS"))
            .await
            .unwrap();

        // Act
        let live = store.get_state_changes_for_event(&event).await.unwrap();
        let purged = store.purge_expired();

        // Assert
        assert_eq!(live.len(), 1);
        assert_eq!(live.latest_version(), Some(1));
        assert_eq!(purged, 1);
        assert_eq!(store.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_append_replaces_expired_row_at_same_version() {
        // Arrange
        let store = InMemoryStateChangeStore::default();
        let event = ingestion("mock-commit");
        let stale_time = fixed_now() - TimeDelta::hours(13);
        store.seed(EventStateChange::new(&event, 0, change("FAILURE"), stale_time));

        // Act
        let outcome = store
            .store_state_change(&event, 0, &event.to_state_change())
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome, StoreOutcome::Stored);
        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event, event.to_state_change());
        assert_eq!(rows[0].event_time, fixed_now());
    }

    #[tokio::test]
    async fn test_commit_query_is_scoped_to_commit() {
        // Arrange
        let store = InMemoryStateChangeStore::default();
        let wanted = ingestion("commit-a");
        let other = ingestion("commit-b");
        store
            .store_state_change(&wanted, 0, &wanted.to_state_change())
            .await
            .unwrap();
        store
            .store_state_change(&other, 0, &other.to_state_change())
            .await
            .unwrap();

        // Act
        let grouped = store
            .get_event_state_changes_for_commit(&wanted.unique_repository_identifier(), "commit-a")
            .await
            .unwrap();

        // Assert
        assert_eq!(grouped.len(), 1);
        assert!(grouped.contains_key(&wanted.unique_identifier()));
    }
}
