//! Route modules.

pub mod commits;
pub mod events;
pub mod health;
