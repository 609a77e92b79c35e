//! Application layer for commit orchestration.

pub mod command_handlers;
pub mod query_handlers;
