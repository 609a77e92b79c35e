//! Covflow Core: shared orchestration abstractions.
//!
//! This crate defines the orchestrated event model, the append-only
//! state-change log types and the traits every store and event bus
//! implements. It contains no infrastructure code.

pub mod bus;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod repository;
pub mod state_change;
