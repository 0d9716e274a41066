//! SQLite-based session storage.
//!
//! Provides persistent storage for:
//! - Fasting session records (live and finished)
//! - Streak records per activity kind

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{data_dir, migrations, SessionStore};
use crate::clock::{Clock, SystemClock};
use crate::error::PersistenceError;
use crate::session::{SessionRecord, SessionStatus, SessionType};
use crate::stats::FastingStats;
use crate::streak::{ActivityKind, StreakRecord};

const SESSION_COLUMNS: &str = "id, session_type, planned_duration_ms, start_time, paused_at,
     total_paused_ms, end_time, actual_duration_ms, status, notes";

/// SQLite database for session storage.
///
/// `updated_at` is stamped from the database's own clock (the system clock
/// unless replaced with [`Database::with_clock`]).
pub struct Database {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

/// Raw column values of a `sessions` row.
struct SessionRow {
    id: String,
    session_type: String,
    planned_duration_ms: u64,
    start_time: String,
    paused_at: Option<String>,
    total_paused_ms: u64,
    end_time: Option<String>,
    actual_duration_ms: Option<u64>,
    status: String,
    notes: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_type: row.get(1)?,
            planned_duration_ms: row.get(2)?,
            start_time: row.get(3)?,
            paused_at: row.get(4)?,
            total_paused_ms: row.get(5)?,
            end_time: row.get(6)?,
            actual_duration_ms: row.get(7)?,
            status: row.get(8)?,
            notes: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<SessionRecord, PersistenceError> {
        let corrupt = |reason: String| PersistenceError::CorruptRecord {
            id: self.id.clone(),
            reason,
        };
        let session_type = SessionType::parse(&self.session_type)
            .ok_or_else(|| corrupt(format!("unknown session type '{}'", self.session_type)))?;
        let status = SessionStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?;
        let start_time = parse_time(&self.start_time).map_err(&corrupt)?;
        let paused_at = self
            .paused_at
            .as_deref()
            .map(parse_time)
            .transpose()
            .map_err(&corrupt)?;
        let end_time = self
            .end_time
            .as_deref()
            .map(parse_time)
            .transpose()
            .map_err(&corrupt)?;

        let record = SessionRecord {
            id: self.id.clone(),
            session_type,
            planned_duration_ms: self.planned_duration_ms,
            start_time,
            paused_at,
            total_paused_ms: self.total_paused_ms,
            end_time,
            actual_duration_ms: self.actual_duration_ms,
            status,
            notes: self.notes,
        };
        record
            .check_invariants()
            .map_err(|reason| corrupt(reason.to_string()))?;
        Ok(record)
    }
}

/// Fixed-width UTC timestamps, so text ordering matches time ordering.
fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{value}': {e}"))
}

impl Database {
    /// Open the database at `~/.config/fastkeeper/fastkeeper.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, PersistenceError> {
        let dir = data_dir().map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        Self::open_at(dir.join("fastkeeper.db"))
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| PersistenceError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        migrations::migrate(&conn)
            .map_err(|e| PersistenceError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Stamp writes with `clock`; share the engine's clock to keep
    /// `updated_at` on the same timeline as the records.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn query_sessions(
        &self,
        where_clause: &str,
        limit: Option<u32>,
    ) -> Result<Vec<SessionRecord>, PersistenceError> {
        let mut sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE {where_clause} ORDER BY start_time DESC"
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], SessionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SessionRow::into_record).collect()
    }

    /// Look up a single session.
    pub fn session(&self, id: &str) -> Result<Option<SessionRecord>, PersistenceError> {
        let row = {
            let conn = self.conn();
            let mut stmt =
                conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"))?;
            let row = stmt.query_row(params![id], SessionRow::from_row).optional()?;
            row
        };
        row.map(SessionRow::into_record).transpose()
    }

    /// Most recent finished sessions.
    pub fn recent_finished(&self, limit: u32) -> Result<Vec<SessionRecord>, PersistenceError> {
        self.query_sessions("status IN ('completed', 'stopped')", Some(limit))
    }

    /// Aggregate statistics over all finished sessions.
    pub fn stats(&self) -> Result<FastingStats, PersistenceError> {
        Ok(FastingStats::from_history(&self.fetch_finished()?))
    }
}

impl SessionStore for Database {
    fn save_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO sessions (
                id, session_type, planned_duration_ms, start_time, paused_at,
                total_paused_ms, end_time, actual_duration_ms, status, notes, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id(),
                record.session_type().as_str(),
                record.planned_duration_ms(),
                format_time(record.start_time()),
                record.paused_at().map(format_time),
                record.total_paused_ms(),
                record.end_time().map(format_time),
                record.actual_duration_ms(),
                record.status().as_str(),
                record.notes(),
                format_time(self.clock.now()),
            ],
        )?;
        Ok(())
    }

    fn fetch_completed(&self, kind: ActivityKind) -> Result<Vec<SessionRecord>, PersistenceError> {
        if kind != ActivityKind::Fasting {
            return Ok(Vec::new());
        }
        self.query_sessions("status = 'completed'", None)
    }

    fn fetch_finished(&self) -> Result<Vec<SessionRecord>, PersistenceError> {
        self.query_sessions("status IN ('completed', 'stopped')", None)
    }

    fn fetch_open(&self) -> Result<Option<SessionRecord>, PersistenceError> {
        Ok(self
            .query_sessions("status IN ('active', 'paused')", Some(1))?
            .into_iter()
            .next())
    }

    fn load_streak(&self, kind: ActivityKind) -> Result<Option<StreakRecord>, PersistenceError> {
        let row = self
            .conn()
            .query_row(
                "SELECT current_streak, longest_streak, last_activity_date
                 FROM streaks WHERE activity_kind = ?1",
                params![kind.as_str()],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((current_streak, longest_streak, last)) = row else {
            return Ok(None);
        };
        let last_activity_date = last
            .map(|value| {
                NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|e| {
                    PersistenceError::CorruptRecord {
                        id: kind.as_str().to_string(),
                        reason: format!("bad date '{value}': {e}"),
                    }
                })
            })
            .transpose()?;

        Ok(Some(StreakRecord {
            activity_kind: kind,
            current_streak,
            longest_streak,
            last_activity_date,
        }))
    }

    fn save_streak(&self, streak: &StreakRecord) -> Result<(), PersistenceError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO streaks
                (activity_kind, current_streak, longest_streak, last_activity_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                streak.activity_kind.as_str(),
                streak.current_streak,
                streak.longest_streak,
                streak
                    .last_activity_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
            ],
        )?;
        Ok(())
    }
}
