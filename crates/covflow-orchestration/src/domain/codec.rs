//! State-change codec.
//!
//! Computes the minimal diff between two states of an aggregate and folds an
//! ordered log of diffs back into a concrete [`OrchestratedEvent`].

use std::sync::Arc;

use covflow_core::error::DomainError;
use covflow_core::event::OrchestratedEvent;
use covflow_core::state_change::{EventStateChangeCollection, StateChange};
use tracing::debug;

/// Diffing and folding of aggregate states.
pub trait StateChangeCodec: Send + Sync {
    /// Returns the fields of `next` that differ from `current`, or every field
    /// of `next` (including its discriminator) when there is no prior state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EventsNotComparable` if `current` and `next` are
    /// different kinds of event.
    fn get_state_change(
        &self,
        current: Option<&OrchestratedEvent>,
        next: &OrchestratedEvent,
    ) -> Result<StateChange, DomainError>;

    /// Merges the changes left to right; later keys overwrite earlier ones.
    fn reduce_state_changes(&self, changes: &EventStateChangeCollection) -> StateChange;

    /// Merges the changes and denormalizes the result into the variant named
    /// by its discriminator.
    ///
    /// The collection is taken behind an `Arc` so that decorators can
    /// recognise a collection they have already reduced by identity.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::CorruptEventSource` if the merged fields do not
    /// describe a complete event, and `DomainError::UnknownEventType` if the
    /// discriminator is not known.
    fn reduce_state_changes_to_event(
        &self,
        changes: &Arc<EventStateChangeCollection>,
    ) -> Result<OrchestratedEvent, DomainError>;
}

/// Codec operating on the flat JSON field map of an event.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStateChangeCodec;

impl StateChangeCodec for JsonStateChangeCodec {
    fn get_state_change(
        &self,
        current: Option<&OrchestratedEvent>,
        next: &OrchestratedEvent,
    ) -> Result<StateChange, DomainError> {
        let next_fields = next.to_state_change();
        let Some(current) = current else {
            return Ok(next_fields);
        };

        if current.event_type() != next.event_type() {
            return Err(DomainError::EventsNotComparable {
                current: current.event_type(),
                next: next.event_type(),
            });
        }

        let current_fields = current.to_state_change();
        Ok(next_fields
            .into_iter()
            .filter(|(field, value)| current_fields.get(field) != Some(value))
            .collect())
    }

    fn reduce_state_changes(&self, changes: &EventStateChangeCollection) -> StateChange {
        changes.iter().fold(StateChange::new(), |mut merged, change| {
            for (field, value) in &change.event {
                merged.insert(field.clone(), value.clone());
            }
            merged
        })
    }

    fn reduce_state_changes_to_event(
        &self,
        changes: &Arc<EventStateChangeCollection>,
    ) -> Result<OrchestratedEvent, DomainError> {
        if changes.is_empty() {
            return Err(DomainError::CorruptEventSource(
                "no state changes to reduce".to_owned(),
            ));
        }

        let merged = self.reduce_state_changes(changes);
        debug!(
            changes = changes.len(),
            fields = merged.len(),
            "reduced state changes"
        );
        OrchestratedEvent::from_state_change(merged)
    }
}
