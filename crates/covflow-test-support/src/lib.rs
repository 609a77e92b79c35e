//! Shared test doubles for the coverage orchestration pipeline.

mod bus;
mod clock;
mod store;

pub use bus::{FailingEventBus, RecordingEventBus};
pub use clock::{FixedClock, fixed_now};
pub use store::{FailingStateChangeStore, InMemoryStateChangeStore};
