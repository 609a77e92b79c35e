//! Outbound event bus abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::OrchestratedEvent;

/// Destination for events produced once a commit has been fully processed.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: &OrchestratedEvent) -> Result<(), DomainError>;
}
