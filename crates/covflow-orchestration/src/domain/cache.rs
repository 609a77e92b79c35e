//! Process-local memoization of state-change folds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use covflow_core::error::DomainError;
use covflow_core::event::OrchestratedEvent;
use covflow_core::state_change::{EventStateChangeCollection, StateChange};
use tracing::trace;

use super::codec::StateChangeCodec;

/// A reduced event together with the collection it was reduced from. Holding
/// the collection keeps its address from being reused while cached.
type CachedReduction = (Arc<EventStateChangeCollection>, OrchestratedEvent);

/// Decorator remembering the event each collection instance reduced to.
///
/// Entries are keyed by the identity of the `Arc`, never by value: a
/// collection loaded afresh is always reduced again, even if its contents
/// are identical. Diffs are never cached because each call describes a new
/// proposed transition. There is no eviction; create one decorator per
/// invocation and drop it afterwards.
#[derive(Debug)]
pub struct CachingStateChangeCodec<C> {
    inner: C,
    reduced: Mutex<HashMap<usize, CachedReduction>>,
}

impl<C: StateChangeCodec> CachingStateChangeCodec<C> {
    /// Wraps `inner` with an empty cache.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            reduced: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached reductions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.reduced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<C: StateChangeCodec> StateChangeCodec for CachingStateChangeCodec<C> {
    fn get_state_change(
        &self,
        current: Option<&OrchestratedEvent>,
        next: &OrchestratedEvent,
    ) -> Result<StateChange, DomainError> {
        self.inner.get_state_change(current, next)
    }

    fn reduce_state_changes(&self, changes: &EventStateChangeCollection) -> StateChange {
        self.inner.reduce_state_changes(changes)
    }

    fn reduce_state_changes_to_event(
        &self,
        changes: &Arc<EventStateChangeCollection>,
    ) -> Result<OrchestratedEvent, DomainError> {
        let key = Arc::as_ptr(changes).addr();

        let cached = self
            .reduced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .filter(|(cached_changes, _)| Arc::ptr_eq(cached_changes, changes))
            .map(|(_, event)| event.clone());
        if let Some(event) = cached {
            trace!("reusing cached reduction");
            return Ok(event);
        }

        let event = self.inner.reduce_state_changes_to_event(changes)?;
        self.reduced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (Arc::clone(changes), event.clone()));
        Ok(event)
    }
}
