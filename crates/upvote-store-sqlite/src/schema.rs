//! SQL schema for the Upvote SQLite store.
//!
//! Applied by [`SqliteStore::migrate`](crate::SqliteStore::migrate). Future
//! migrations will be gated on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per authenticated voter; the whole history as a JSON object
-- mapping item key to 1 or -1.
CREATE TABLE IF NOT EXISTS user_histories (
    user_id     INTEGER PRIMARY KEY,
    history     TEXT NOT NULL DEFAULT '{}',
    updated_at  TEXT NOT NULL
);

-- One row per (element, group). An empty item_group means no group.
CREATE TABLE IF NOT EXISTS element_totals (
    element_id      INTEGER NOT NULL,
    item_group      TEXT    NOT NULL DEFAULT '',
    tally           INTEGER NOT NULL DEFAULT 0,
    total_votes     INTEGER NOT NULL DEFAULT 0,
    total_upvotes   INTEGER NOT NULL DEFAULT 0,
    total_downvotes INTEGER NOT NULL DEFAULT 0,
    legacy_total    INTEGER NOT NULL DEFAULT 0,  -- tally carried over from an older scoring scheme
    updated_at      TEXT    NOT NULL,
    PRIMARY KEY (element_id, item_group),
    CHECK (total_votes = total_upvotes + total_downvotes),
    CHECK (tally = total_upvotes - total_downvotes)
);

PRAGMA user_version = 1;
";

/// Name of the table whose presence marks a provisioned history store.
pub const HISTORY_TABLE: &str = "user_histories";
