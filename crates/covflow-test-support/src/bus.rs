//! Test event buses: mock `EventBus` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use covflow_core::bus::EventBus;
use covflow_core::error::DomainError;
use covflow_core::event::OrchestratedEvent;

/// An event bus that records every published event and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    published: Mutex<Vec<OrchestratedEvent>>,
}

impl RecordingEventBus {
    /// Creates an empty recording bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all events that were published.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published_events(&self) -> Vec<OrchestratedEvent> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, event: &OrchestratedEvent) -> Result<(), DomainError> {
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// An event bus that rejects every publish with an infrastructure error.
#[derive(Debug)]
pub struct FailingEventBus;

#[async_trait]
impl EventBus for FailingEventBus {
    async fn publish(&self, _event: &OrchestratedEvent) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("event bus unavailable".into()))
    }
}
