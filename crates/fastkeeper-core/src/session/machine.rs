//! Session state machine.
//!
//! ## State Transitions
//!
//! ```text
//! start -> Active <-> Paused
//!          Active  -> Completed   (detector only)
//!          Active | Paused -> Stopped
//! ```
//!
//! Completed and Stopped are terminal. A rejected transition leaves the
//! record untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::accountant;
use super::record::{SessionRecord, SessionStatus, SessionType};
use crate::clock::{millis_between, Clock};
use crate::error::{EngineError, Operation, Result};
use crate::events::Event;

/// Owns every write to a [`SessionRecord`]'s status and timing fields.
#[derive(Clone)]
pub struct SessionStateMachine {
    clock: Arc<dyn Clock>,
}

impl SessionStateMachine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(
        &self,
        session_type: SessionType,
        planned_duration_ms: u64,
        notes: impl Into<String>,
    ) -> Result<SessionRecord> {
        if planned_duration_ms == 0 {
            return Err(EngineError::InvalidDuration);
        }
        Ok(SessionRecord {
            id: Uuid::new_v4().to_string(),
            session_type,
            planned_duration_ms,
            start_time: self.clock.now(),
            paused_at: None,
            total_paused_ms: 0,
            end_time: None,
            actual_duration_ms: None,
            status: SessionStatus::Active,
            notes: notes.into(),
        })
    }

    pub fn pause(&self, record: &mut SessionRecord) -> Result<Event> {
        require(record, Operation::Pause, &[SessionStatus::Active])?;
        let now = self.clock.now();
        let elapsed_ms = accountant::elapsed_ms(record, now);
        record.paused_at = Some(now);
        record.status = SessionStatus::Paused;
        Ok(Event::SessionPaused {
            session_id: record.id.clone(),
            elapsed_ms,
            at: now,
        })
    }

    pub fn resume(&self, record: &mut SessionRecord) -> Result<Event> {
        require(record, Operation::Resume, &[SessionStatus::Paused])?;
        let now = self.clock.now();
        let paused_for_ms = record
            .paused_at
            .map(|paused_at| millis_between(paused_at, now))
            .unwrap_or(0);
        record.total_paused_ms = record.total_paused_ms.saturating_add(paused_for_ms);
        record.paused_at = None;
        record.status = SessionStatus::Active;
        Ok(Event::SessionResumed {
            session_id: record.id.clone(),
            paused_for_ms,
            elapsed_ms: accountant::elapsed_ms(record, now),
            at: now,
        })
    }

    pub fn stop(&self, record: &mut SessionRecord) -> Result<Event> {
        require(
            record,
            Operation::Stop,
            &[SessionStatus::Active, SessionStatus::Paused],
        )?;
        let now = self.clock.now();
        let actual = self.finish(record, SessionStatus::Stopped, now);
        Ok(Event::SessionStopped {
            session_id: record.id.clone(),
            actual_duration_ms: actual,
            at: now,
        })
    }

    /// Terminal transition driven by the completion detector.
    pub(crate) fn complete(&self, record: &mut SessionRecord) -> Result<Event> {
        require(record, Operation::Complete, &[SessionStatus::Active])?;
        let now = self.clock.now();
        let actual = self.finish(record, SessionStatus::Completed, now);
        Ok(Event::SessionCompleted {
            session_id: record.id.clone(),
            actual_duration_ms: actual,
            at: now,
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn finish(&self, record: &mut SessionRecord, status: SessionStatus, now: DateTime<Utc>) -> u64 {
        // Elapsed must be read before the status flips, or it would return
        // the (still unset) actual duration.
        let actual = accountant::elapsed_ms(record, now);
        record.paused_at = None;
        record.end_time = Some(now);
        record.actual_duration_ms = Some(actual);
        record.status = status;
        actual
    }
}

fn require(record: &SessionRecord, op: Operation, allowed: &[SessionStatus]) -> Result<()> {
    if allowed.contains(&record.status) {
        Ok(())
    } else {
        Err(EngineError::IllegalTransition {
            op,
            from: record.status,
        })
    }
}
