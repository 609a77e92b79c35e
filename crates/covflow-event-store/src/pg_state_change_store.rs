//! `PostgreSQL` implementation of the `StateChangeStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use covflow_core::clock::Clock;
use covflow_core::error::DomainError;
use covflow_core::event::OrchestratedEvent;
use covflow_core::repository::{StateChangeStore, StoreOutcome};
use covflow_core::state_change::{
    CommitStateChanges, EventStateChange, EventStateChangeCollection, StateChange,
};

use crate::schema::CREATE_STATE_CHANGES_TABLE;

const SELECT_COLUMNS: &str = r#"identifier, version, repository_identifier, "commit", provider,
    owner, repository, event, event_time, expiry"#;

/// PostgreSQL-backed state-change store.
///
/// Appends use `INSERT .. ON CONFLICT` against the `(identifier, version)`
/// primary key, so a live version can be claimed by exactly one writer.
/// `PostgreSQL` has no native row TTL: reads skip rows whose expiry has
/// passed, an append may overwrite such a row in place, and
/// [`PgStateChangeStore::purge_expired`] deletes them.
#[derive(Clone)]
pub struct PgStateChangeStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PgStateChangeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStateChangeStore")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl PgStateChangeStore {
    /// Creates a new `PgStateChangeStore`.
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Creates the state-change table and its indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_STATE_CHANGES_TABLE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }

    /// Deletes every row whose expiry has passed and returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the delete fails.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM event_state_changes WHERE expiry <= $1")
            .bind(self.clock.epoch_seconds())
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "purged expired state changes");
        }
        Ok(purged)
    }

    async fn load_live_version(
        &self,
        identifier: &str,
        version: i64,
        now: i64,
    ) -> Result<Option<EventStateChange>, DomainError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM event_state_changes \
             WHERE identifier = $1 AND version = $2 AND expiry > $3"
        );
        sqlx::query_as::<_, StateChangeRow>(&query)
            .bind(identifier)
            .bind(version)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?
            .map(EventStateChange::try_from)
            .transpose()
    }
}

#[async_trait]
impl StateChangeStore for PgStateChangeStore {
    #[instrument(skip(self, event, change), fields(identifier = %event.unique_identifier()))]
    async fn store_state_change(
        &self,
        event: &OrchestratedEvent,
        version: i64,
        change: &StateChange,
    ) -> Result<StoreOutcome, DomainError> {
        if version < 0 {
            return Err(DomainError::Validation(format!(
                "state change version must be non-negative, got {version}"
            )));
        }

        let now = self.clock.now();
        let row = EventStateChange::new(event, version, change.clone(), now);
        let payload = serde_json::to_string(&row.event).map_err(|e| {
            DomainError::Infrastructure(format!("state change serialization failed: {e}"))
        })?;

        let result = sqlx::query(
            r#"INSERT INTO event_state_changes
                (identifier, version, repository_identifier, "commit", provider,
                 owner, repository, event, event_time, expiry)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               ON CONFLICT (identifier, version) DO UPDATE SET
                   repository_identifier = EXCLUDED.repository_identifier,
                   "commit" = EXCLUDED."commit",
                   provider = EXCLUDED.provider,
                   owner = EXCLUDED.owner,
                   repository = EXCLUDED.repository,
                   event = EXCLUDED.event,
                   event_time = EXCLUDED.event_time,
                   expiry = EXCLUDED.expiry
               WHERE event_state_changes.expiry <= $9"#,
        )
        .bind(&row.identifier)
        .bind(row.version)
        .bind(&row.repository_identifier)
        .bind(&row.commit)
        .bind(row.provider.as_str())
        .bind(&row.owner)
        .bind(&row.repository)
        .bind(&payload)
        .bind(row.event_time.timestamp())
        .bind(row.expiry.timestamp())
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;

        if result.rows_affected() == 1 {
            debug!(version, "stored state change");
            return Ok(StoreOutcome::Stored);
        }

        warn!(version, "state change version already taken");
        match self
            .load_live_version(&row.identifier, version, now.timestamp())
            .await?
        {
            Some(existing) => Ok(StoreOutcome::Conflict {
                existing: Box::new(existing),
            }),
            None => Err(DomainError::Infrastructure(format!(
                "version {version} of {} conflicted but could not be read back",
                row.identifier
            ))),
        }
    }

    #[instrument(skip(self, event), fields(identifier = %event.unique_identifier()))]
    async fn get_state_changes_for_event(
        &self,
        event: &OrchestratedEvent,
    ) -> Result<EventStateChangeCollection, DomainError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM event_state_changes \
             WHERE identifier = $1 AND expiry > $2 ORDER BY version ASC"
        );
        let rows = sqlx::query_as::<_, StateChangeRow>(&query)
            .bind(event.unique_identifier())
            .bind(self.clock.epoch_seconds())
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        rows.into_iter().map(EventStateChange::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn get_event_state_changes_for_commit(
        &self,
        repository_identifier: &str,
        commit: &str,
    ) -> Result<CommitStateChanges, DomainError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM event_state_changes \
             WHERE repository_identifier = $1 AND \"commit\" = $2 AND expiry > $3 \
             ORDER BY identifier ASC, version ASC"
        );
        let rows = sqlx::query_as::<_, StateChangeRow>(&query)
            .bind(repository_identifier)
            .bind(commit)
            .bind(self.clock.epoch_seconds())
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        let changes = rows
            .into_iter()
            .map(EventStateChange::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EventStateChangeCollection::group_by_identifier(changes))
    }
}

/// A row of `event_state_changes` as stored.
#[derive(Debug, sqlx::FromRow)]
struct StateChangeRow {
    identifier: String,
    version: i64,
    repository_identifier: String,
    commit: String,
    provider: String,
    owner: String,
    repository: String,
    event: String,
    event_time: i64,
    expiry: i64,
}

impl TryFrom<StateChangeRow> for EventStateChange {
    type Error = DomainError;

    fn try_from(row: StateChangeRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| {
            DomainError::CorruptEventSource(format!(
                "{what} in version {} of {}",
                row.version, row.identifier
            ))
        };

        let provider = row
            .provider
            .parse()
            .map_err(|_| corrupt(&format!("unknown provider `{}`", row.provider)))?;
        let event: StateChange = serde_json::from_str(&row.event)
            .map_err(|e| corrupt(&format!("unreadable state change ({e})")))?;
        let event_time = from_epoch_seconds(row.event_time).ok_or_else(|| corrupt("bad event time"))?;
        let expiry = from_epoch_seconds(row.expiry).ok_or_else(|| corrupt("bad expiry"))?;

        Ok(Self {
            identifier: row.identifier,
            version: row.version,
            provider,
            owner: row.owner,
            repository: row.repository,
            commit: row.commit,
            repository_identifier: row.repository_identifier,
            event,
            event_time,
            expiry,
        })
    }
}

fn from_epoch_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

#[allow(clippy::needless_pass_by_value)]
fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}
