//! Command abstractions.

use uuid::Uuid;

/// Trait implemented by every instruction a producer sends to the
/// orchestrator.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID tracing this command through the pipeline.
    fn correlation_id(&self) -> Uuid;
}
