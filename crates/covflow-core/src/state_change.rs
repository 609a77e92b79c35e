//! Rows of the append-only state-change log.

use std::collections::BTreeMap;
use std::collections::btree_map::Values;

use chrono::{DateTime, TimeDelta, Utc};

use crate::event::{OrchestratedEvent, Provider};

/// A partial or complete field map of an orchestrated event.
pub type StateChange = serde_json::Map<String, serde_json::Value>;

/// How long a state change is kept before it is purged.
pub const STATE_CHANGE_RETENTION_HOURS: i64 = 12;

/// State changes for every aggregate of one commit, keyed by the aggregate's
/// unique identifier.
pub type CommitStateChanges = BTreeMap<String, EventStateChangeCollection>;

/// One immutable row of the state-change log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStateChange {
    /// Unique identifier of the aggregate.
    pub identifier: String,
    /// Position of this change within the aggregate's log.
    pub version: i64,
    /// Provider hosting the repository.
    pub provider: Provider,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repository: String,
    /// Commit SHA.
    pub commit: String,
    /// Provider, owner and repository combined.
    pub repository_identifier: String,
    /// Fields that changed in this version.
    pub event: StateChange,
    /// When the transition was recorded.
    pub event_time: DateTime<Utc>,
    /// When the row becomes eligible for purging.
    pub expiry: DateTime<Utc>,
}

impl EventStateChange {
    /// Builds the row recording `change` as version `version` of the
    /// aggregate `event` belongs to.
    #[must_use]
    pub fn new(
        event: &OrchestratedEvent,
        version: i64,
        change: StateChange,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: event.unique_identifier(),
            version,
            provider: event.provider(),
            owner: event.owner().to_owned(),
            repository: event.repository().to_owned(),
            commit: event.commit().to_owned(),
            repository_identifier: event.unique_repository_identifier(),
            event: change,
            event_time: now,
            expiry: now + TimeDelta::hours(STATE_CHANGE_RETENTION_HOURS),
        }
    }

    /// Returns `true` once the retention window has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Version-ordered set of state changes.
///
/// Holds at most one change per version; inserting a version that is already
/// present replaces it. Iteration always yields ascending versions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStateChangeCollection {
    changes: BTreeMap<i64, EventStateChange>,
}

impl EventStateChangeCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a change, returning the change previously held at that version.
    pub fn insert(&mut self, change: EventStateChange) -> Option<EventStateChange> {
        self.changes.insert(change.version, change)
    }

    /// Returns the change recorded at `version`.
    #[must_use]
    pub fn get(&self, version: i64) -> Option<&EventStateChange> {
        self.changes.get(&version)
    }

    /// Number of changes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if no changes are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterates the changes in ascending version order.
    pub fn iter(&self) -> Values<'_, i64, EventStateChange> {
        self.changes.values()
    }

    /// Returns the change with the highest version.
    #[must_use]
    pub fn latest(&self) -> Option<&EventStateChange> {
        self.changes.values().next_back()
    }

    /// Returns the highest version held.
    #[must_use]
    pub fn latest_version(&self) -> Option<i64> {
        self.changes.keys().next_back().copied()
    }

    /// Version the next appended change must use.
    #[must_use]
    pub fn next_version(&self) -> i64 {
        self.latest_version().map_or(0, |version| version + 1)
    }

    /// Splits changes belonging to many aggregates into one collection per
    /// aggregate identifier.
    #[must_use]
    pub fn group_by_identifier(
        changes: impl IntoIterator<Item = EventStateChange>,
    ) -> CommitStateChanges {
        let mut grouped = CommitStateChanges::new();
        for change in changes {
            grouped
                .entry(change.identifier.clone())
                .or_default()
                .insert(change);
        }
        grouped
    }
}

impl FromIterator<EventStateChange> for EventStateChangeCollection {
    fn from_iter<T: IntoIterator<Item = EventStateChange>>(iter: T) -> Self {
        let mut collection = Self::new();
        for change in iter {
            collection.insert(change);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a EventStateChangeCollection {
    type Item = &'a EventStateChange;
    type IntoIter = Values<'a, i64, EventStateChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::event::{Ingestion, Job, OrchestratedEventState};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn ingestion() -> OrchestratedEvent {
        OrchestratedEvent::Ingestion(Ingestion {
            provider: Provider::Github,
            owner: "mock-owner".to_owned(),
            repository: "mock-repository".to_owned(),
            commit: "mock-commit".to_owned(),
            state: OrchestratedEventState::Ongoing,
        })
    }

    fn change_at(event: &OrchestratedEvent, version: i64, marker: &str) -> EventStateChange {
        let mut fields = StateChange::new();
        fields.insert("marker".to_owned(), json!(marker));
        EventStateChange::new(event, version, fields, fixed_now())
    }

    #[test]
    fn test_new_denormalizes_identity_and_sets_expiry() {
        let event = ingestion();

        let change = change_at(&event, 0, "a");

        assert_eq!(change.identifier, event.unique_identifier());
        assert_eq!(change.repository_identifier, "github#mock-owner#mock-repository");
        assert_eq!(change.commit, "mock-commit");
        assert_eq!(change.event_time, fixed_now());
        assert_eq!(change.expiry, fixed_now() + TimeDelta::hours(12));
        assert!(!change.is_expired(fixed_now()));
        assert!(change.is_expired(fixed_now() + TimeDelta::hours(12)));
    }

    #[test]
    fn test_iteration_is_version_ordered_regardless_of_insertion_order() {
        let event = ingestion();
        let mut collection = EventStateChangeCollection::new();

        collection.insert(change_at(&event, 2, "c"));
        collection.insert(change_at(&event, 0, "a"));
        collection.insert(change_at(&event, 1, "b"));

        let versions: Vec<i64> = collection.iter().map(|c| c.version).collect();
        assert_eq!(versions, vec![0, 1, 2]);
        assert_eq!(collection.latest_version(), Some(2));
        assert_eq!(collection.next_version(), 3);
    }

    #[test]
    fn test_duplicate_version_overwrites_locally() {
        let event = ingestion();
        let mut collection = EventStateChangeCollection::new();

        assert!(collection.insert(change_at(&event, 0, "first")).is_none());
        let replaced = collection.insert(change_at(&event, 0, "second"));

        assert_eq!(replaced.unwrap().event["marker"], "first");
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get(0).unwrap().event["marker"], "second");
    }

    #[test]
    fn test_empty_collection_starts_at_version_zero() {
        let collection = EventStateChangeCollection::new();

        assert!(collection.is_empty());
        assert!(collection.latest().is_none());
        assert_eq!(collection.next_version(), 0);
    }

    #[test]
    fn test_group_by_identifier_separates_aggregates() {
        let ingestion = ingestion();
        let job = OrchestratedEvent::Job(Job {
            provider: Provider::Github,
            owner: "mock-owner".to_owned(),
            repository: "mock-repository".to_owned(),
            commit: "mock-commit".to_owned(),
            state: OrchestratedEventState::Ongoing,
            external_id: "mock-external-id".to_owned(),
        });

        let grouped = EventStateChangeCollection::group_by_identifier(vec![
            change_at(&job, 1, "j1"),
            change_at(&ingestion, 0, "i0"),
            change_at(&job, 0, "j0"),
        ]);

        assert_eq!(grouped.len(), 2);
        let job_changes = &grouped[&job.unique_identifier()];
        let markers: Vec<&str> = job_changes
            .iter()
            .map(|c| c.event["marker"].as_str().unwrap())
            .collect();
        assert_eq!(markers, vec!["j0", "j1"]);
        assert_eq!(grouped[&ingestion.unique_identifier()].len(), 1);
    }
}
