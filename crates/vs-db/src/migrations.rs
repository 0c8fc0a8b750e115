//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order. A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use vs_core::{Error, Result};

/// V1: users, tokens, channels and assets.
const V1_INITIAL: &str = r#"
CREATE TABLE users (
    id         TEXT PRIMARY KEY,
    username   TEXT UNIQUE NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE auth_tokens (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token      TEXT UNIQUE NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE channels (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    asset_count INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE assets (
    id                 TEXT PRIMARY KEY,
    channel_id         TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    title              TEXT NOT NULL,
    description        TEXT NOT NULL DEFAULT '',
    category           TEXT,
    tags               TEXT NOT NULL DEFAULT '[]',
    privacy            TEXT NOT NULL DEFAULT 'public',
    storage_path       TEXT NOT NULL UNIQUE,
    thumbnail_path     TEXT,
    thumbnail_source   TEXT,
    duration_secs      REAL NOT NULL DEFAULT 0,
    resolution         TEXT NOT NULL,
    size_bytes         INTEGER NOT NULL,
    status             TEXT NOT NULL DEFAULT 'PROCESSING'
                       CHECK (status IN ('PROCESSING', 'READY', 'FAILED')),
    processing_journal TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    published_at       TEXT
);

CREATE INDEX idx_assets_channel ON assets(channel_id);
CREATE INDEX idx_assets_status  ON assets(status);
"#;

/// V2: durable finalize job queue.
const V2_FINALIZE_JOBS: &str = r#"
CREATE TABLE finalize_jobs (
    id           TEXT PRIMARY KEY,
    asset_id     TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'queued',
    attempts     INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    run_after    TEXT NOT NULL,
    locked_by    TEXT,
    locked_at    TEXT,
    error        TEXT,
    created_at   TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX idx_finalize_jobs_due   ON finalize_jobs(status, run_after);
CREATE INDEX idx_finalize_jobs_asset ON finalize_jobs(asset_id);
"#;

/// V3: seed the anonymous user and its channel.
///
/// Requests act as this user when auth is disabled or the configured API key
/// is presented, so it needs a channel to upload into.
const V3_ANONYMOUS: &str = r#"
INSERT OR IGNORE INTO users (id, username, created_at)
VALUES ('00000000-0000-0000-0000-000000000000', 'anonymous', strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
INSERT OR IGNORE INTO channels (id, user_id, name, asset_count, created_at)
VALUES ('00000000-0000-0000-0000-000000000000', '00000000-0000-0000-0000-000000000000',
        'anonymous', 0, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, V1_INITIAL),
    (2, V2_FINALIZE_JOBS),
    (3, V3_ANONYMOUS),
];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;
        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
