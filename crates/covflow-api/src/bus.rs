//! Event bus backed by structured logging.

use async_trait::async_trait;
use covflow_core::bus::EventBus;
use covflow_core::error::DomainError;
use covflow_core::event::OrchestratedEvent;
use tracing::info;

/// Emits every published event as a structured log record on the
/// `covflow::bus` target, for log-based forwarding to downstream consumers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventBus;

#[async_trait]
impl EventBus for TracingEventBus {
    async fn publish(&self, event: &OrchestratedEvent) -> Result<(), DomainError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            DomainError::Infrastructure(format!("event serialization failed: {e}"))
        })?;

        info!(
            target: "covflow::bus",
            event_type = %event.event_type(),
            identifier = %event.unique_identifier(),
            payload = %payload,
            "published event"
        );
        Ok(())
    }
}
