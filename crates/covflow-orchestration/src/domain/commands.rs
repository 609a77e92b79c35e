//! Commands for commit orchestration.

use covflow_core::command::Command;
use covflow_core::event::OrchestratedEvent;
use uuid::Uuid;

/// Command recording the latest known state of an ingestion or CI job.
#[derive(Debug, Clone)]
pub struct RecordStateChange {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The proposed state of the aggregate.
    pub event: OrchestratedEvent,
    /// Git ref the commit was pushed to, carried into the finalised event.
    pub git_ref: String,
    /// Pull request the commit belongs to, if any.
    pub pull_request: Option<u64>,
}

impl Command for RecordStateChange {
    fn command_type(&self) -> &'static str {
        "orchestration.record_state_change"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
