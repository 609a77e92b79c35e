//! Covflow: commit orchestration.
//!
//! Tracks the progress of every coverage-file ingestion and CI job reported
//! for a commit, and publishes a single finalised event once all of them
//! have reached a terminal state.

pub mod application;
pub mod domain;
