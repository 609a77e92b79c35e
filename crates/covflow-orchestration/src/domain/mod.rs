//! Domain layer for commit orchestration.

pub mod cache;
pub mod codec;
pub mod commands;
