use serde::{Deserialize, Serialize};

use crate::session::{SessionRecord, SessionStatus};

/// Aggregate over finished sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FastingStats {
    pub completed_sessions: u64,
    pub stopped_sessions: u64,
    /// Sum of actual durations of completed sessions.
    pub total_fasted_ms: u64,
    pub longest_fast_ms: u64,
    /// Completed / (completed + stopped), 0.0 with no finished sessions.
    pub completion_rate: f64,
}

impl FastingStats {
    /// Summarize `history`. Live sessions are skipped.
    pub fn from_history<'a>(history: impl IntoIterator<Item = &'a SessionRecord>) -> Self {
        let mut stats = Self::default();
        for record in history {
            let actual = record.actual_duration_ms().unwrap_or(0);
            match record.status() {
                SessionStatus::Completed => {
                    stats.completed_sessions += 1;
                    stats.total_fasted_ms = stats.total_fasted_ms.saturating_add(actual);
                    stats.longest_fast_ms = stats.longest_fast_ms.max(actual);
                }
                SessionStatus::Stopped => stats.stopped_sessions += 1,
                SessionStatus::Active | SessionStatus::Paused => {}
            }
        }
        let finished = stats.completed_sessions + stats.stopped_sessions;
        if finished > 0 {
            stats.completion_rate = stats.completed_sessions as f64 / finished as f64;
        }
        stats
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
    fn summarizes_finished_sessions() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let machine = SessionStateMachine::new(clock.clone());

        let mut stopped = machine.start(SessionType::Custom, 60_000, "").unwrap();
        clock.advance_secs(10);
        machine.stop(&mut stopped).unwrap();

        let mut completed = machine.start(SessionType::Custom, 60_000, "").unwrap();
        clock.advance_secs(60);
        machine.complete(&mut completed).unwrap();

        let live = machine.start(SessionType::Custom, 60_000, "").unwrap();

        let stats = FastingStats::from_history([&stopped, &completed, &live]);
        assert_eq!(stats.completed_sessions, 1);
        assert_eq!(stats.stopped_sessions, 1);
        assert_eq!(stats.total_fasted_ms, 60_000);
        assert_eq!(stats.longest_fast_ms, 60_000);
        assert_eq!(stats.completion_rate, 0.5);
    }

    #[test]
    fn empty_history() {
        let stats = FastingStats::from_history(std::iter::empty());
        assert_eq!(stats, FastingStats::default());
    }
}
