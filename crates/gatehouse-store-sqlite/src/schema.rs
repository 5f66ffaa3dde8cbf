//! SQL schema for the Gatehouse SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS manifests (
    manifest_id TEXT PRIMARY KEY,
    source      TEXT NOT NULL,
    purpose     TEXT NOT NULL,
    raw_text    TEXT NOT NULL,   -- the policy text is the source of truth
    status      TEXT NOT NULL    -- 'enabled' | 'disabled'
);

CREATE TABLE IF NOT EXISTS filters (
    filter_id TEXT PRIMARY KEY,
    source    TEXT NOT NULL,
    rule_type TEXT NOT NULL,     -- FilterRule discriminant
    value     TEXT NOT NULL,
    enabled   INTEGER NOT NULL DEFAULT 1
);

-- One row per (source, item); re-syncs replace in place.
CREATE TABLE IF NOT EXISTS cached_data (
    source         TEXT NOT NULL,
    source_item_id TEXT NOT NULL,
    kind           TEXT NOT NULL,
    item_timestamp TEXT NOT NULL,
    data           TEXT NOT NULL,  -- JSON object, possibly sealed
    cached_at      TEXT NOT NULL,
    expires_at     TEXT,           -- NULL never expires
    PRIMARY KEY (source, source_item_id)
);

CREATE TABLE IF NOT EXISTS staging (
    action_id    TEXT PRIMARY KEY,
    source       TEXT NOT NULL,
    action_type  TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    purpose      TEXT NOT NULL,
    status       TEXT NOT NULL,   -- 'pending' | 'approved' | 'committed' | 'rejected'
    proposed_at  TEXT NOT NULL,
    resolved_at  TEXT
);

-- The ledger is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS audit_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    at           TEXT NOT NULL,
    event        TEXT NOT NULL,
    source       TEXT NOT NULL,
    details_json TEXT NOT NULL DEFAULT '{}'
);

-- At most one credential record per source; token columns are ciphertext.
CREATE TABLE IF NOT EXISTS oauth_tokens (
    source            TEXT PRIMARY KEY,
    access_token      TEXT NOT NULL,
    refresh_token     TEXT,
    token_type        TEXT NOT NULL,
    expires_at        TEXT,
    scopes            TEXT NOT NULL DEFAULT '',
    account_info_json TEXT
);

CREATE INDEX IF NOT EXISTS manifests_source_idx   ON manifests(source);
CREATE INDEX IF NOT EXISTS filters_source_idx     ON filters(source);
CREATE INDEX IF NOT EXISTS cached_expires_idx     ON cached_data(source, expires_at);
CREATE INDEX IF NOT EXISTS staging_status_idx     ON staging(status);
CREATE INDEX IF NOT EXISTS audit_event_idx        ON audit_log(event);
CREATE INDEX IF NOT EXISTS audit_source_idx       ON audit_log(source);

PRAGMA user_version = 1;
";
