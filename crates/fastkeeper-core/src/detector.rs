//! Completion detection.
//!
//! The detector samples the accountant on a fixed interval and decides, per
//! tick, whether the live session must complete. Decisions are made from the
//! record's current status and the wall clock only, so:
//!
//! - completion fires at most once, however many ticks arrive late
//! - a gap of any length (suspension, sleep) is absorbed in a single tick
//!
//! [`CompletionDetector::evaluate`] is the pure decision;
//! [`FastingEngine::tick`](crate::FastingEngine::tick) applies it, and
//! [`spawn_detector`] drives it from a tokio task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error};

use crate::engine::FastingEngine;
use crate::error::{EngineError, Result};
use crate::session::{accountant, SessionRecord, SessionStatus};

/// What a tick should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Planned duration reached while active.
    Complete,
    /// Still live; refresh the display.
    Refresh,
    /// Terminal; nothing left to do.
    Idle,
}

/// Result of one engine tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session is still live; keep ticking.
    Continue,
    /// This tick completed the session.
    Completed,
    /// No live session (terminal, discarded or replaced); stop ticking.
    Finished,
}

impl TickOutcome {
    pub fn should_continue(&self) -> bool {
        matches!(self, TickOutcome::Continue)
    }
}

pub struct CompletionDetector;

impl CompletionDetector {
    pub fn evaluate(record: &SessionRecord, now: DateTime<Utc>) -> TickDecision {
        match record.status() {
            SessionStatus::Active if accountant::is_due(record, now) => TickDecision::Complete,
            SessionStatus::Active | SessionStatus::Paused => TickDecision::Refresh,
            SessionStatus::Completed | SessionStatus::Stopped => TickDecision::Idle,
        }
    }
}

/// Rate limit for tick snapshots.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotThrottle {
    min_interval_ms: u64,
    last: Option<DateTime<Utc>>,
}

impl SnapshotThrottle {
    pub(crate) fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last: None,
        }
    }

    /// Whether a snapshot may go out at `now`; records it if so.
    pub(crate) fn ready(&mut self, now: DateTime<Utc>) -> bool {
        let ready = match self.last {
            None => true,
            // A clock that jumped backwards must not mute the display.
            Some(last) if now < last => true,
            Some(last) => (now - last).num_milliseconds() as u64 >= self.min_interval_ms,
        };
        if ready {
            self.last = Some(now);
        }
        ready
    }

    /// Count a transition snapshot against the limit.
    pub(crate) fn mark(&mut self, now: DateTime<Utc>) {
        self.last = Some(now);
    }
}

/// Running detector task. Dropping the handle stops the task.
pub struct DetectorHandle {
    session_id: String,
    task: Option<JoinHandle<()>>,
}

impl DetectorHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop ticking now.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Wait for the loop to end on its own (session terminal or discarded).
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Detector task for session {} failed: {}", self.session_id, e);
                }
            }
        }
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Tick the engine's live session on its configured interval until the
/// session is terminal, discarded or replaced.
///
/// Must be called from within a tokio runtime.
pub fn spawn_detector(engine: &Arc<FastingEngine>) -> Result<DetectorHandle> {
    let session_id = engine
        .current()
        .filter(|record| record.status().is_live())
        .map(|record| record.id().to_string())
        .ok_or(EngineError::NoSession)?;

    let tick_interval = engine.config().tick_interval();
    let engine = Arc::clone(engine);
    let id = session_id.clone();

    let task = tokio::spawn(async move {
        let mut interval = time::interval(tick_interval);
        // After a suspension, one catch-up tick is enough: elapsed time is
        // recomputed from the wall clock.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match engine.tick_session(&id) {
                Ok(TickOutcome::Continue) => {}
                Ok(outcome) => {
                    debug!("Detector for session {} stopping: {:?}", id, outcome);
                    break;
                }
                Err(e) => {
                    error!("Detector for session {} aborted: {}", id, e);
                    break;
                }
            }
        }
    });

    Ok(DetectorHandle {
        session_id,
        task: Some(task),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::session::{SessionStateMachine, SessionType};
    use chrono::Duration;

    #[test]
    fn evaluate_follows_status_and_clock() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let machine = SessionStateMachine::new(clock.clone());
        let mut record = machine.start(SessionType::Custom, 60_000, "").unwrap();

        assert_eq!(CompletionDetector::evaluate(&record, clock.now()), TickDecision::Refresh);
        clock.advance_secs(60);
        assert_eq!(CompletionDetector::evaluate(&record, clock.now()), TickDecision::Complete);

        machine.pause(&mut record).unwrap();
        clock.advance_secs(3600);
        assert_eq!(CompletionDetector::evaluate(&record, clock.now()), TickDecision::Refresh);

        machine.stop(&mut record).unwrap();
        assert_eq!(CompletionDetector::evaluate(&record, clock.now()), TickDecision::Idle);
    }

    #[test]
    fn throttle_spaces_snapshots() {
        let t0 = Utc::now();
        let mut throttle = SnapshotThrottle::new(1_000);
        assert!(throttle.ready(t0));
        assert!(!throttle.ready(t0 + Duration::milliseconds(400)));
        assert!(throttle.ready(t0 + Duration::milliseconds(1_000)));
        assert!(throttle.ready(t0 - Duration::seconds(30)));
    }

    #[test]
    fn zero_interval_throttle_never_blocks() {
        let t0 = Utc::now();
        let mut throttle = SnapshotThrottle::new(0);
        assert!(throttle.ready(t0));
        assert!(throttle.ready(t0));
    }
}
