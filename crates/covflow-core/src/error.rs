//! Domain error types.

use thiserror::Error;

use crate::event::OrchestratedEventType;

/// Top-level domain error type.
///
/// A write conflict is deliberately absent: it is reported through
/// [`StoreOutcome::Conflict`](crate::repository::StoreOutcome) because the
/// caller is expected to recover from it.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No state changes exist for the requested aggregate.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    /// Two events of different shapes were passed to the diff computation.
    #[error("events not comparable: cannot diff {current} against {next}")]
    EventsNotComparable {
        /// Discriminator of the last known state.
        current: OrchestratedEventType,
        /// Discriminator of the proposed state.
        next: OrchestratedEventType,
    },

    /// The folded state-change log does not describe a complete aggregate.
    #[error("corrupt event source: {0}")]
    CorruptEventSource(String),

    /// A folded state-change log names a discriminator that is not known.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Every attempt to append a state change lost the race to another writer.
    #[error("gave up appending to {identifier} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted {
        /// The aggregate that kept conflicting.
        identifier: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for errors caused by a damaged or truncated log.
    #[must_use]
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, Self::CorruptEventSource(_) | Self::UnknownEventType(_))
    }
}
