//! Persistence collaborator and configuration.
//!
//! The engine talks to storage only through [`SessionStore`]. Two stores are
//! provided: [`MemoryStore`] for hosts that persist elsewhere (and for tests)
//! and the SQLite-backed [`Database`].

mod config;
pub mod database;
pub mod migrations;

pub use config::EngineConfig;
pub use database::Database;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::PersistenceError;
use crate::session::{SessionRecord, SessionStatus};
use crate::streak::{ActivityKind, StreakRecord};

/// Returns `~/.config/fastkeeper[-dev]/` based on FASTKEEPER_ENV.
///
/// Set FASTKEEPER_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FASTKEEPER_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("fastkeeper-dev")
    } else {
        base_dir.join("fastkeeper")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Storage contract consumed by the engine.
///
/// Session records are fasting records, so only [`ActivityKind::Fasting`]
/// ever has session history. Calls are treated as synchronous; an
/// implementation that defers work must keep writes for one record in order.
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session record.
    fn save_session(&self, record: &SessionRecord) -> Result<(), PersistenceError>;

    /// Completed sessions for `kind`, most recent first.
    fn fetch_completed(&self, kind: ActivityKind) -> Result<Vec<SessionRecord>, PersistenceError>;

    /// Completed and stopped sessions, most recent first.
    fn fetch_finished(&self) -> Result<Vec<SessionRecord>, PersistenceError>;

    /// The most recent active or paused session, if one survived a restart.
    fn fetch_open(&self) -> Result<Option<SessionRecord>, PersistenceError>;

    fn load_streak(&self, kind: ActivityKind) -> Result<Option<StreakRecord>, PersistenceError>;

    fn save_streak(&self, streak: &StreakRecord) -> Result<(), PersistenceError>;
}

#[derive(Default)]
struct MemoryInner {
    sessions: HashMap<String, SessionRecord>,
    streaks: HashMap<ActivityKind, StreakRecord>,
    failing: bool,
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`PersistenceError::Unavailable`] until reset.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Stored copy of a session, if any.
    pub fn session(&self, id: &str) -> Option<SessionRecord> {
        self.lock().sessions.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn checked(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, PersistenceError> {
        let guard = self.lock();
        if guard.failing {
            return Err(PersistenceError::Unavailable("memory store offline".into()));
        }
        Ok(guard)
    }

    fn sorted_where(
        &self,
        keep: impl Fn(&SessionRecord) -> bool,
    ) -> Result<Vec<SessionRecord>, PersistenceError> {
        let guard = self.checked()?;
        let mut records: Vec<SessionRecord> =
            guard.sessions.values().filter(|r| keep(r)).cloned().collect();
        records.sort_by(|a, b| b.start_time().cmp(&a.start_time()));
        Ok(records)
    }
}

impl SessionStore for MemoryStore {
    fn save_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        self.checked()?
            .sessions
            .insert(record.id().to_string(), record.clone());
        Ok(())
    }

    fn fetch_completed(&self, kind: ActivityKind) -> Result<Vec<SessionRecord>, PersistenceError> {
        if kind != ActivityKind::Fasting {
            drop(self.checked()?);
            return Ok(Vec::new());
        }
        self.sorted_where(|r| r.status() == SessionStatus::Completed)
    }

    fn fetch_finished(&self) -> Result<Vec<SessionRecord>, PersistenceError> {
        self.sorted_where(|r| r.status().is_terminal())
    }

    fn fetch_open(&self) -> Result<Option<SessionRecord>, PersistenceError> {
        Ok(self
            .sorted_where(|r| r.status().is_live())?
            .into_iter()
            .next())
    }

    fn load_streak(&self, kind: ActivityKind) -> Result<Option<StreakRecord>, PersistenceError> {
        Ok(self.checked()?.streaks.get(&kind).cloned())
    }

    fn save_streak(&self, streak: &StreakRecord) -> Result<(), PersistenceError> {
        self.checked()?
            .streaks
            .insert(streak.activity_kind, streak.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::{SessionStateMachine, SessionType};
    use chrono::Utc;
    use std::sync::Arc;

    #[test]
    fn memory_store_filters_by_status() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let machine = SessionStateMachine::new(clock.clone());
        let store = MemoryStore::new();

        let mut done = machine.start(SessionType::Custom, 1_000, "").unwrap();
        clock.advance_secs(2);
        machine.complete(&mut done).unwrap();
        store.save_session(&done).unwrap();

        clock.advance_secs(2);
        let open = machine.start(SessionType::Custom, 1_000, "").unwrap();
        store.save_session(&open).unwrap();

        assert_eq!(store.fetch_completed(ActivityKind::Fasting).unwrap(), vec![done.clone()]);
        assert!(store.fetch_completed(ActivityKind::Dieting).unwrap().is_empty());
        assert_eq!(store.fetch_open().unwrap(), Some(open));
        assert_eq!(store.fetch_finished().unwrap().len(), 1);
    }

    #[test]
    fn failing_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let err = store.load_streak(ActivityKind::Fasting).unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
        store.set_failing(false);
        assert!(store.load_streak(ActivityKind::Fasting).unwrap().is_none());
    }

    #[test]
    fn dieting_history_is_empty_but_still_checks_availability() {
        let store = MemoryStore::new();
        assert!(store.fetch_completed(ActivityKind::Dieting).unwrap().is_empty());
        store.set_failing(true);
        assert!(matches!(
            store.fetch_completed(ActivityKind::Dieting),
            Err(PersistenceError::Unavailable(_))
        ));
        // The store lock was released; later calls still work.
        store.set_failing(false);
        assert!(store.fetch_completed(ActivityKind::Dieting).unwrap().is_empty());
    }
}
