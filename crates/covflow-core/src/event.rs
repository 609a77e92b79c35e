//! Orchestrated event model.
//!
//! An orchestrated event is one tracked unit of work for a commit: the
//! ingestion of a single uploaded coverage file, a single CI job, or the
//! terminal event published once every tracked unit has finished. Events
//! serialize to a flat field map tagged with a `type` discriminator, which is
//! the shape persisted in the state-change log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::state_change::StateChange;

/// Field name carrying the variant discriminator in a serialized event.
pub const EVENT_TYPE_FIELD: &str = "type";

const IDENTIFIER_SEPARATOR: &str = "#";

/// Source-control provider hosting a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// github.com
    Github,
    /// gitlab.com
    Gitlab,
}

impl Provider {
    /// Returns the wire name of the provider.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            other => Err(DomainError::Validation(format!("unknown provider: {other}"))),
        }
    }
}

/// Progress of a tracked unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratedEventState {
    /// Work is still in flight.
    Ongoing,
    /// Work finished successfully.
    Success,
    /// Work finished unsuccessfully.
    Failure,
}

impl OrchestratedEventState {
    /// Terminal states expect no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Closed set of event discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrchestratedEventType {
    /// See [`Ingestion`].
    Ingestion,
    /// See [`Job`].
    Job,
    /// See [`Finalised`].
    Finalised,
}

impl OrchestratedEventType {
    /// Returns the discriminator as written in the `type` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "INGESTION",
            Self::Job => "JOB",
            Self::Finalised => "FINALISED",
        }
    }
}

impl fmt::Display for OrchestratedEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrchestratedEventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INGESTION" => Ok(Self::Ingestion),
            "JOB" => Ok(Self::Job),
            "FINALISED" => Ok(Self::Finalised),
            other => Err(DomainError::UnknownEventType(other.to_owned())),
        }
    }
}

/// Progress of ingesting one uploaded coverage file for a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingestion {
    /// Provider hosting the repository.
    pub provider: Provider,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repository: String,
    /// Commit SHA.
    pub commit: String,
    /// Ingestion progress.
    pub state: OrchestratedEventState,
}

/// Progress of one CI pipeline job for a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Provider hosting the repository.
    pub provider: Provider,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repository: String,
    /// Commit SHA.
    pub commit: String,
    /// Job progress.
    pub state: OrchestratedEventState,
    /// Identifier the CI provider assigned to the job.
    pub external_id: String,
}

/// State carried by every [`Finalised`] event. Serializes as `"SUCCESS"` and
/// rejects any other value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FinalisedState;

impl From<FinalisedState> for OrchestratedEventState {
    fn from(_: FinalisedState) -> Self {
        Self::Success
    }
}

impl Serialize for FinalisedState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        OrchestratedEventState::Success.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FinalisedState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match OrchestratedEventState::deserialize(deserializer)? {
            OrchestratedEventState::Success => Ok(Self),
            other => Err(serde::de::Error::custom(format!(
                "finalised events are always SUCCESS, got {other:?}"
            ))),
        }
    }
}

/// Published once every tracked unit of work for a commit is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalised {
    /// Provider hosting the repository.
    pub provider: Provider,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repository: String,
    /// Commit SHA.
    pub commit: String,
    /// Always `SUCCESS`.
    #[serde(default)]
    pub state: FinalisedState,
    /// Git ref the commit was pushed to.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Pull request the commit belongs to, if any.
    pub pull_request: Option<u64>,
    /// When the commit was found to be complete.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub event_time: DateTime<Utc>,
}

/// A tracked aggregate, tagged by its discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratedEvent {
    /// A coverage file ingestion.
    Ingestion(Ingestion),
    /// A CI job.
    Job(Job),
    /// The commit-level outcome.
    Finalised(Finalised),
}

impl OrchestratedEvent {
    /// Returns the discriminator of this event.
    #[must_use]
    pub fn event_type(&self) -> OrchestratedEventType {
        match self {
            Self::Ingestion(_) => OrchestratedEventType::Ingestion,
            Self::Job(_) => OrchestratedEventType::Job,
            Self::Finalised(_) => OrchestratedEventType::Finalised,
        }
    }

    /// Returns the provider hosting the repository.
    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            Self::Ingestion(e) => e.provider,
            Self::Job(e) => e.provider,
            Self::Finalised(e) => e.provider,
        }
    }

    /// Returns the repository owner.
    #[must_use]
    pub fn owner(&self) -> &str {
        match self {
            Self::Ingestion(e) => &e.owner,
            Self::Job(e) => &e.owner,
            Self::Finalised(e) => &e.owner,
        }
    }

    /// Returns the repository name.
    #[must_use]
    pub fn repository(&self) -> &str {
        match self {
            Self::Ingestion(e) => &e.repository,
            Self::Job(e) => &e.repository,
            Self::Finalised(e) => &e.repository,
        }
    }

    /// Returns the commit SHA.
    #[must_use]
    pub fn commit(&self) -> &str {
        match self {
            Self::Ingestion(e) => &e.commit,
            Self::Job(e) => &e.commit,
            Self::Finalised(e) => &e.commit,
        }
    }

    /// Returns the progress of the event.
    #[must_use]
    pub fn state(&self) -> OrchestratedEventState {
        match self {
            Self::Ingestion(e) => e.state,
            Self::Job(e) => e.state,
            Self::Finalised(e) => e.state.into(),
        }
    }

    /// Deterministic key of the aggregate this event belongs to.
    ///
    /// Built from the discriminator, provider, owner, repository and commit,
    /// plus the external job id for jobs.
    #[must_use]
    pub fn unique_identifier(&self) -> String {
        let mut parts = vec![
            self.event_type().as_str(),
            self.provider().as_str(),
            self.owner(),
            self.repository(),
            self.commit(),
        ];
        if let Self::Job(job) = self {
            parts.push(&job.external_id);
        }
        parts.join(IDENTIFIER_SEPARATOR)
    }

    /// Key shared by every aggregate of the same repository, across commits.
    #[must_use]
    pub fn unique_repository_identifier(&self) -> String {
        repository_identifier(self.provider(), self.owner(), self.repository())
    }

    /// Serializes the event into a flat field map including the `type`
    /// discriminator.
    ///
    /// # Panics
    ///
    /// Never in practice: every variant wraps a plain struct, which always
    /// serializes to a JSON object.
    #[must_use]
    pub fn to_state_change(&self) -> StateChange {
        // Serialization of derived Serialize types to Value is infallible.
        let value =
            serde_json::to_value(self).expect("OrchestratedEvent serialization is infallible");
        match value {
            Value::Object(fields) => fields,
            other => unreachable!("tagged event serialized to a non-object: {other}"),
        }
    }

    /// Denormalizes a flat field map into the variant named by its `type`
    /// field.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::CorruptEventSource` if the discriminator is
    /// missing or the map lacks fields the variant requires, and
    /// `DomainError::UnknownEventType` if the discriminator is not known.
    pub fn from_state_change(fields: StateChange) -> Result<Self, DomainError> {
        let event_type: OrchestratedEventType = match fields.get(EVENT_TYPE_FIELD) {
            Some(Value::String(tag)) => tag.parse()?,
            Some(other) => return Err(DomainError::UnknownEventType(other.to_string())),
            None => {
                return Err(DomainError::CorruptEventSource(format!(
                    "missing `{EVENT_TYPE_FIELD}` discriminator"
                )));
            }
        };

        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            DomainError::CorruptEventSource(format!("cannot denormalize {event_type} event: {e}"))
        })
    }
}

/// Builds the repository identifier shared by every aggregate of a repository.
#[must_use]
pub fn repository_identifier(provider: Provider, owner: &str, repository: &str) -> String {
    [provider.as_str(), owner, repository].join(IDENTIFIER_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn ingestion(state: OrchestratedEventState) -> OrchestratedEvent {
        OrchestratedEvent::Ingestion(Ingestion {
            provider: Provider::Github,
            owner: "mock-owner".to_owned(),
            repository: "mock-repository".to_owned(),
            commit: "mock-commit".to_owned(),
            state,
        })
    }

    fn job(external_id: &str) -> OrchestratedEvent {
        OrchestratedEvent::Job(Job {
            provider: Provider::Github,
            owner: "mock-owner".to_owned(),
            repository: "mock-repository".to_owned(),
            commit: "mock-commit".to_owned(),
            state: OrchestratedEventState::Ongoing,
            external_id: external_id.to_owned(),
        })
    }

    #[test]
    fn test_unique_identifier_includes_discriminator_and_commit() {
        let event = ingestion(OrchestratedEventState::Ongoing);

        assert_eq!(
            event.unique_identifier(),
            "INGESTION#github#mock-owner#mock-repository#mock-commit"
        );
    }

    #[test]
    fn test_unique_identifier_for_job_includes_external_id() {
        assert_eq!(
            job("job-1").unique_identifier(),
            "JOB#github#mock-owner#mock-repository#mock-commit#job-1"
        );
        assert_ne!(job("job-1").unique_identifier(), job("job-2").unique_identifier());
    }

    #[test]
    fn test_unique_identifier_ignores_state() {
        assert_eq!(
            ingestion(OrchestratedEventState::Ongoing).unique_identifier(),
            ingestion(OrchestratedEventState::Failure).unique_identifier()
        );
    }

    #[test]
    fn test_repository_identifier_is_shared_across_variants() {
        let expected = "github#mock-owner#mock-repository";

        assert_eq!(
            ingestion(OrchestratedEventState::Ongoing).unique_repository_identifier(),
            expected
        );
        assert_eq!(job("job-1").unique_repository_identifier(), expected);
    }

    #[test]
    fn test_to_state_change_includes_discriminator() {
        let fields = job("job-1").to_state_change();

        assert_eq!(
            serde_json::Value::Object(fields),
            json!({
                "type": "JOB",
                "provider": "github",
                "owner": "mock-owner",
                "repository": "mock-repository",
                "commit": "mock-commit",
                "state": "ONGOING",
                "externalId": "job-1",
            })
        );
    }

    #[test]
    fn test_finalised_serializes_ref_and_epoch_event_time() {
        let event = OrchestratedEvent::Finalised(Finalised {
            provider: Provider::Github,
            owner: "mock-owner".to_owned(),
            repository: "mock-repository".to_owned(),
            commit: "mock-commit".to_owned(),
            state: FinalisedState,
            git_ref: "main".to_owned(),
            pull_request: Some(12),
            event_time: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        });

        let fields = event.to_state_change();

        assert_eq!(fields["state"], "SUCCESS");
        assert_eq!(fields["ref"], "main");
        assert_eq!(fields["pullRequest"], 12);
        assert_eq!(fields["eventTime"], 1_768_471_200);
        assert_eq!(event.state(), OrchestratedEventState::Success);
        assert_eq!(OrchestratedEvent::from_state_change(fields).unwrap(), event);
    }

    #[test]
    fn test_finalised_with_non_success_state_is_corrupt() {
        let fields = json!({
            "type": "FINALISED",
            "provider": "github",
            "owner": "mock-owner",
            "repository": "mock-repository",
            "commit": "mock-commit",
            "state": "FAILURE",
            "ref": "main",
            "pullRequest": null,
            "eventTime": 1_768_471_200,
        });
        let serde_json::Value::Object(fields) = fields else {
            unreachable!()
        };

        let result = OrchestratedEvent::from_state_change(fields);

        assert!(matches!(result, Err(DomainError::CorruptEventSource(_))));
    }

    #[test]
    fn test_from_state_change_rejects_unknown_discriminator() {
        let fields = json!({ "type": "DEPLOYMENT", "commit": "1" });
        let serde_json::Value::Object(fields) = fields else {
            unreachable!()
        };

        let result = OrchestratedEvent::from_state_change(fields);

        match result {
            Err(DomainError::UnknownEventType(tag)) => assert_eq!(tag, "DEPLOYMENT"),
            other => panic!("expected UnknownEventType, got {other:?}"),
        }
    }

    #[test]
    fn test_from_state_change_rejects_missing_discriminator() {
        let mut fields = ingestion(OrchestratedEventState::Ongoing).to_state_change();
        fields.remove(EVENT_TYPE_FIELD);

        let result = OrchestratedEvent::from_state_change(fields);

        assert!(matches!(result, Err(DomainError::CorruptEventSource(_))));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrchestratedEventState::Ongoing.is_terminal());
        assert!(OrchestratedEventState::Success.is_terminal());
        assert!(OrchestratedEventState::Failure.is_terminal());
    }
}
