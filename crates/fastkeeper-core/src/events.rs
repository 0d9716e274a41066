use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionType;
use crate::streak::ActivityKind;

/// Every state change in the engine produces an Event.
/// Hosts receive them through [`SnapshotListener::on_event`](crate::live::SnapshotListener::on_event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: String,
        session_type: SessionType,
        planned_duration_ms: u64,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_id: String,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: String,
        /// Length of the pause that just ended.
        paused_for_ms: u64,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    SessionStopped {
        session_id: String,
        actual_duration_ms: u64,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: String,
        actual_duration_ms: u64,
        at: DateTime<Utc>,
    },
    StreakUpdated {
        kind: ActivityKind,
        current_streak: u32,
        longest_streak: u32,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Session the event refers to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Event::SessionStarted { session_id, .. }
            | Event::SessionPaused { session_id, .. }
            | Event::SessionResumed { session_id, .. }
            | Event::SessionStopped { session_id, .. }
            | Event::SessionCompleted { session_id, .. } => Some(session_id),
            Event::StreakUpdated { .. } => None,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::SessionStarted { at, .. }
            | Event::SessionPaused { at, .. }
            | Event::SessionResumed { at, .. }
            | Event::SessionStopped { at, .. }
            | Event::SessionCompleted { at, .. }
            | Event::StreakUpdated { at, .. } => *at,
        }
    }
}
