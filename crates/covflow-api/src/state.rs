//! Shared application state.

use std::sync::Arc;

use covflow_core::bus::EventBus;
use covflow_core::clock::Clock;
use covflow_core::repository::StateChangeStore;
use covflow_orchestration::application::command_handlers::Orchestration;
use covflow_orchestration::domain::codec::StateChangeCodec;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Source of event times.
    pub clock: Arc<dyn Clock>,
    /// Append-only state-change log.
    pub store: Arc<dyn StateChangeStore>,
    /// Destination of finalised events.
    pub bus: Arc<dyn EventBus>,
    /// Append attempts allowed per producer event.
    pub conflict_retry_limit: u32,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conflict_retry_limit", &self.conflict_retry_limit)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn StateChangeStore>,
        bus: Arc<dyn EventBus>,
        conflict_retry_limit: u32,
    ) -> Self {
        Self {
            clock,
            store,
            bus,
            conflict_retry_limit,
        }
    }

    /// Borrows the collaborators of the decision loop for one request.
    #[must_use]
    pub fn orchestration<'a>(&'a self, codec: &'a dyn StateChangeCodec) -> Orchestration<'a> {
        Orchestration {
            codec,
            store: self.store.as_ref(),
            bus: self.bus.as_ref(),
            clock: self.clock.as_ref(),
            max_attempts: self.conflict_retry_limit,
        }
    }
}
