//! PostgreSQL-backed state-change store.

pub mod pg_state_change_store;
pub mod schema;
