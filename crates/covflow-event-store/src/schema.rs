//! State-change store database schema.
//!
//! Mirrors `migrations/20260115100000_create_event_state_changes.sql`.

/// SQL to create the state-change table and its commit index.
///
/// The primary key on `(identifier, version)` is what rejects a second writer
/// at an already-used version. `commit` is a reserved word and stays quoted.
pub const CREATE_STATE_CHANGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS event_state_changes (
    identifier            VARCHAR(512) NOT NULL,
    version               BIGINT NOT NULL CHECK (version >= 0),
    repository_identifier VARCHAR(512) NOT NULL,
    "commit"              VARCHAR(255) NOT NULL,
    provider              VARCHAR(32) NOT NULL,
    owner                 VARCHAR(255) NOT NULL,
    repository            VARCHAR(255) NOT NULL,
    event                 TEXT NOT NULL,
    event_time            BIGINT NOT NULL,
    expiry                BIGINT NOT NULL,
    PRIMARY KEY (identifier, version)
);

CREATE INDEX IF NOT EXISTS idx_event_state_changes_commit
    ON event_state_changes (repository_identifier, "commit");

CREATE INDEX IF NOT EXISTS idx_event_state_changes_expiry
    ON event_state_changes (expiry);
"#;
