//! Database schema migrations for fastkeeper.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{debug, warn};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!("Failed to read schema_version: {}", e);
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    debug!("Database schema at version {}", version);
    Ok(())
}

/// Migration v1: sessions and streaks.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id                  TEXT PRIMARY KEY,
            session_type        TEXT NOT NULL,
            planned_duration_ms INTEGER NOT NULL,
            start_time          TEXT NOT NULL,
            paused_at           TEXT,
            total_paused_ms     INTEGER NOT NULL DEFAULT 0,
            end_time            TEXT,
            actual_duration_ms  INTEGER,
            status              TEXT NOT NULL,
            notes               TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS streaks (
            activity_kind      TEXT PRIMARY KEY,
            current_streak     INTEGER NOT NULL DEFAULT 0,
            longest_streak     INTEGER NOT NULL DEFAULT 0,
            last_activity_date TEXT
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: write timestamps and lookup indexes.
///
/// Adds `updated_at` to sessions (backfilled from `start_time`) and indexes
/// for the status and start-time queries the store runs.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE sessions ADD COLUMN updated_at TEXT NOT NULL DEFAULT '';
         UPDATE sessions SET updated_at = start_time WHERE updated_at = '';
         CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
         CREATE INDEX IF NOT EXISTS idx_sessions_status_start ON sessions(status, start_time);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}
