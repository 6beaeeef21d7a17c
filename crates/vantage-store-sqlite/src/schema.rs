//! SQL schema for the Vantage SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS entities (
    entity_id    TEXT PRIMARY KEY,
    slug         TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    enabled      INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);

-- Current value per (entity, field). Superseded values survive only in
-- audit_log; rows are upserted, never deleted.
CREATE TABLE IF NOT EXISTS field_values (
    entity_id          TEXT NOT NULL REFERENCES entities(entity_id),
    field              TEXT NOT NULL,
    value_json         TEXT NOT NULL,   -- tagged FieldData JSON
    source_tier        TEXT NOT NULL,   -- 'live' | 'secondary' | 'known_fallback' | 'manual'
    confidence         INTEGER NOT NULL,
    last_updated       TEXT NOT NULL,   -- ISO 8601 UTC
    manually_corrected INTEGER NOT NULL DEFAULT 0,
    correction_reason  TEXT,
    PRIMARY KEY (entity_id, field)
);

-- Strictly append-only hash chain of ChangeRecords.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS audit_log (
    sequence    INTEGER PRIMARY KEY,
    change_id   TEXT NOT NULL UNIQUE,
    entity_id   TEXT NOT NULL REFERENCES entities(entity_id),
    field       TEXT NOT NULL,
    session_id  TEXT,
    recorded_at TEXT NOT NULL,
    record_json TEXT NOT NULL,
    prev_hash   TEXT NOT NULL,
    hash        TEXT NOT NULL
);

-- Latest explicit human verification per entity.
CREATE TABLE IF NOT EXISTS verifications (
    entity_id   TEXT PRIMARY KEY REFERENCES entities(entity_id),
    verified_at TEXT NOT NULL,
    verified_by TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS refresh_sessions (
    session_id   TEXT PRIMARY KEY,
    started_at   TEXT NOT NULL,
    status       TEXT NOT NULL,
    session_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_entity_idx   ON audit_log(entity_id, sequence);
CREATE INDEX IF NOT EXISTS audit_session_idx  ON audit_log(session_id);
CREATE INDEX IF NOT EXISTS sessions_start_idx ON refresh_sessions(started_at);

PRAGMA user_version = 1;
";
