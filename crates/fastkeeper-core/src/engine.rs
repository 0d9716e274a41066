//! Fasting engine.
//!
//! Ties the state machine, completion detector, live display, persistence
//! and streak tracking together around a single live [`SessionRecord`].
//! All collaborators are injected; there is no global state.
//!
//! ## Ordering
//!
//! The live record sits behind one mutex. Every transition and every tick
//! runs under it, including the snapshot, publisher and store calls it
//! triggers, so ticks never observe a half-applied transition and writes for
//! a record reach the store in order.
//!
//! ## Durability
//!
//! Store failures are logged and do not undo the in-memory transition. A
//! crash between a transition and a successful save loses that transition.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::detector::{CompletionDetector, SnapshotThrottle, TickDecision, TickOutcome};
use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::live::{
    EndReason, LiveDisplay, LiveStatusPublisher, NoListener, NoLiveStatus, Snapshot,
    SnapshotListener,
};
use crate::session::{SessionRecord, SessionStateMachine, SessionStatus, SessionType};
use crate::stats::FastingStats;
use crate::storage::{EngineConfig, SessionStore};
use crate::streak::{ActivityKind, StreakRecord, StreakTracker};

struct LiveSession {
    record: Option<SessionRecord>,
    display: LiveDisplay,
    throttle: SnapshotThrottle,
}

pub struct FastingEngine {
    clock: Arc<dyn Clock>,
    machine: SessionStateMachine,
    store: Arc<dyn SessionStore>,
    listener: Arc<dyn SnapshotListener>,
    tracker: StreakTracker,
    config: EngineConfig,
    live: Mutex<LiveSession>,
}

impl FastingEngine {
    /// Engine on the system clock with no live display and no listener.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::assemble(
            Arc::new(SystemClock),
            store,
            Arc::new(NoLiveStatus),
            Arc::new(NoListener),
            EngineConfig::default(),
        )
    }

    // Builders may be used on a running engine; the held session and its
    // live display carry over.

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.machine = SessionStateMachine::new(clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn LiveStatusPublisher>) -> Self {
        let now = self.clock.now();
        let live = self.live.get_mut().unwrap_or_else(|e| e.into_inner());
        live.display.discard();
        live.display = LiveDisplay::new(publisher);
        if let Some(record) = live.record.as_ref().filter(|r| r.status().is_live()) {
            live.display.begin(&Snapshot::of(record, now));
        }
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn SnapshotListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.tracker = tracker_for(&config);
        let live = self.live.get_mut().unwrap_or_else(|e| e.into_inner());
        live.throttle = SnapshotThrottle::new(snapshot_interval_ms(&config));
        self.config = config;
        self
    }

    fn assemble(
        clock: Arc<dyn Clock>,
        store: Arc<dyn SessionStore>,
        publisher: Arc<dyn LiveStatusPublisher>,
        listener: Arc<dyn SnapshotListener>,
        config: EngineConfig,
    ) -> Self {
        let live = LiveSession {
            record: None,
            display: LiveDisplay::new(publisher),
            throttle: SnapshotThrottle::new(snapshot_interval_ms(&config)),
        };
        Self {
            machine: SessionStateMachine::new(clock.clone()),
            clock,
            store,
            listener,
            tracker: tracker_for(&config),
            config,
            live: Mutex::new(live),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The session the engine holds, live or just finished.
    pub fn current(&self) -> Option<SessionRecord> {
        self.lock().record.clone()
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        let now = self.clock.now();
        self.lock()
            .record
            .as_ref()
            .map(|record| Snapshot::of(record, now))
    }

    /// Stored streak for `kind`.
    pub fn streak(&self, kind: ActivityKind) -> Result<Option<StreakRecord>> {
        Ok(self.store.load_streak(kind)?)
    }

    /// Streak as it should be displayed today (0 after a skipped day).
    pub fn effective_streak(&self, kind: ActivityKind) -> Result<u32> {
        let today = self.tracker.calendar_day(self.clock.now());
        Ok(self
            .streak(kind)?
            .map(|streak| streak.effective_streak(today))
            .unwrap_or(0))
    }

    pub fn stats(&self) -> Result<FastingStats> {
        Ok(FastingStats::from_history(&self.store.fetch_finished()?))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a new session. Rejected while another session is active or paused.
    pub fn start(
        &self,
        session_type: SessionType,
        planned_duration_ms: u64,
        notes: impl Into<String>,
    ) -> Result<SessionRecord> {
        let mut live = self.lock();
        if let Some(existing) = live.record.as_ref().filter(|r| r.status().is_live()) {
            return Err(EngineError::SessionInProgress {
                id: existing.id().to_string(),
            });
        }

        let record = self
            .machine
            .start(session_type, planned_duration_ms, notes)?;
        info!(
            "Started {} session {} for {} ms",
            session_type.display_name(),
            record.id(),
            planned_duration_ms
        );
        let event = Event::SessionStarted {
            session_id: record.id().to_string(),
            session_type,
            planned_duration_ms,
            at: record.start_time(),
        };
        live.record = Some(record.clone());
        self.after_transition(&mut live, event);
        Ok(record)
    }

    /// Start a session of the configured default type using its duration hint.
    pub fn start_default(&self, notes: impl Into<String>) -> Result<SessionRecord> {
        let session_type = self.config.default_session_type;
        let planned = session_type
            .planned_duration_hint_ms()
            .ok_or(EngineError::InvalidDuration)?;
        self.start(session_type, planned, notes)
    }

    pub fn pause(&self) -> Result<SessionRecord> {
        self.transition(|machine, record| machine.pause(record))
    }

    pub fn resume(&self) -> Result<SessionRecord> {
        self.transition(|machine, record| machine.resume(record))
    }

    pub fn stop(&self) -> Result<SessionRecord> {
        self.transition(|machine, record| machine.stop(record))
    }

    /// One completion-detector tick against whatever session is live.
    pub fn tick(&self) -> Result<TickOutcome> {
        let mut live = self.lock();
        self.tick_locked(&mut live)
    }

    /// Tick only if `session_id` is still the live session.
    pub fn tick_session(&self, session_id: &str) -> Result<TickOutcome> {
        let mut live = self.lock();
        let is_live = live.record.as_ref().is_some_and(|r| r.id() == session_id);
        if !is_live {
            return Ok(TickOutcome::Finished);
        }
        self.tick_locked(&mut live)
    }

    /// Pick up a session left active or paused by a previous run.
    ///
    /// The next tick accounts for all time passed since, and completes the
    /// session if its planned duration was reached meanwhile.
    pub fn restore(&self) -> Result<Option<SessionRecord>> {
        let mut live = self.lock();
        if let Some(existing) = live.record.as_ref().filter(|r| r.status().is_live()) {
            return Err(EngineError::SessionInProgress {
                id: existing.id().to_string(),
            });
        }
        let Some(record) = self.store.fetch_open()? else {
            return Ok(None);
        };
        info!("Restored {} session {}", record.status(), record.id());

        let now = self.clock.now();
        let snapshot = Snapshot::of(&record, now);
        live.record = Some(record.clone());
        live.display.begin(&snapshot);
        live.throttle.mark(now);
        self.listener.on_snapshot(&snapshot);
        Ok(Some(record))
    }

    /// Let go of the live session without a transition (for example when
    /// the owning screen goes away). The record stays in the store as-is and
    /// any detector loop for it stops on its next tick.
    pub fn discard(&self) -> Option<SessionRecord> {
        let mut live = self.lock();
        live.display.discard();
        let record = live.record.take();
        if let Some(record) = record.as_ref() {
            debug!("Discarded session {} ({})", record.id(), record.status());
        }
        record
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, LiveSession> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(
        &self,
        apply: impl FnOnce(&SessionStateMachine, &mut SessionRecord) -> Result<Event>,
    ) -> Result<SessionRecord> {
        let mut live = self.lock();
        let record = live.record.as_mut().ok_or(EngineError::NoSession)?;
        let event = apply(&self.machine, record)?;
        let record = record.clone();
        debug!("Session {} is now {}", record.id(), record.status());
        self.after_transition(&mut live, event);
        Ok(record)
    }

    fn tick_locked(&self, live: &mut LiveSession) -> Result<TickOutcome> {
        let now = self.clock.now();
        let Some(record) = live.record.as_mut() else {
            return Ok(TickOutcome::Finished);
        };

        match CompletionDetector::evaluate(record, now) {
            TickDecision::Idle => Ok(TickOutcome::Finished),
            TickDecision::Refresh => {
                if live.throttle.ready(now) {
                    let snapshot = Snapshot::of(record, now);
                    live.display.refresh(&snapshot);
                    self.listener.on_snapshot(&snapshot);
                }
                Ok(TickOutcome::Continue)
            }
            TickDecision::Complete => {
                let event = self.machine.complete(record).map_err(|_| {
                    let err = EngineError::DetectorInvariantViolation {
                        id: record.id().to_string(),
                        status: record.status(),
                    };
                    error!("{}", err);
                    err
                })?;
                info!(
                    "Session {} completed after {} ms",
                    record.id(),
                    record.actual_duration_ms().unwrap_or(0)
                );
                self.after_transition(live, event);
                Ok(TickOutcome::Completed)
            }
        }
    }

    /// Snapshot, display, listener and store fan-out for a transition that
    /// has already been applied to `live.record`.
    fn after_transition(&self, live: &mut LiveSession, event: Event) {
        let Some(record) = live.record.as_ref() else {
            return;
        };
        let now = self.clock.now();
        let snapshot = Snapshot::of(record, now);

        match &event {
            Event::SessionStarted { .. } => live.display.begin(&snapshot),
            Event::SessionCompleted { .. } => {
                let reason = match now.checked_add_signed(self.config.completion_linger()) {
                    Some(linger_until) => EndReason::AtTime(linger_until),
                    None => {
                        warn!("Completion linger overflows the clock; using platform default");
                        EndReason::Default
                    }
                };
                live.display.finish(&snapshot, reason);
            }
            Event::SessionStopped { .. } => live.display.finish(&snapshot, EndReason::Immediate),
            _ => live.display.refresh(&snapshot),
        }
        live.throttle.mark(now);

        self.listener.on_snapshot(&snapshot);
        self.listener.on_event(&event);
        self.persist(record);

        if record.status() == SessionStatus::Completed {
            if let Some(streak_event) = self.refresh_streak(record) {
                self.listener.on_event(&streak_event);
            }
        }
    }

    fn persist(&self, record: &SessionRecord) {
        if let Err(e) = self.store.save_session(record) {
            warn!(
                "Failed to persist session {} ({}); keeping in-memory state: {}",
                record.id(),
                record.status(),
                e
            );
        }
    }

    /// Recompute the fasting streak after `completed` finished. Never fails;
    /// store errors are logged and the in-memory record still counts.
    fn refresh_streak(&self, completed: &SessionRecord) -> Option<Event> {
        let kind = ActivityKind::Fasting;
        let mut history = match self.store.fetch_completed(kind) {
            Ok(history) => history,
            Err(e) => {
                warn!("Failed to load completed sessions for streak: {}", e);
                Vec::new()
            }
        };
        if !history.iter().any(|r| r.id() == completed.id()) {
            history.push(completed.clone());
        }

        let previous = self.store.load_streak(kind).unwrap_or_else(|e| {
            warn!("Failed to load previous streak: {}", e);
            None
        });
        let streak = self.tracker.recompute(previous.as_ref(), kind, &history);
        if let Err(e) = self.store.save_streak(&streak) {
            warn!("Failed to persist {} streak: {}", kind.as_str(), e);
        }
        debug!(
            "{} streak now {} (longest {})",
            kind.as_str(),
            streak.current_streak,
            streak.longest_streak
        );

        Some(Event::StreakUpdated {
            kind,
            current_streak: streak.current_streak,
            longest_streak: streak.longest_streak,
            at: self.clock.now(),
        })
    }
}

fn tracker_for(config: &EngineConfig) -> StreakTracker {
    match config.streak_offset() {
        Ok(offset) => StreakTracker::new(offset),
        Err(e) => {
            warn!("{}; counting streak days in UTC", e);
            StreakTracker::utc()
        }
    }
}

fn snapshot_interval_ms(config: &EngineConfig) -> u64 {
    u64::try_from(config.snapshot_interval().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn engine() -> (Arc<ManualClock>, Arc<MemoryStore>, FastingEngine) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new());
        let engine = FastingEngine::new(store.clone()).with_clock(clock.clone());
        (clock, store, engine)
    }

    #[test]
    fn second_start_is_rejected_while_live() {
        let (_, _, engine) = engine();
        let first = engine.start(SessionType::Custom, 60_000, "").unwrap();
        let err = engine.start(SessionType::Custom, 60_000, "").unwrap_err();
        match err {
            EngineError::SessionInProgress { id } => assert_eq!(id, first.id()),
            other => panic!("unexpected error: {other}"),
        }
        engine.pause().unwrap();
        assert!(engine.start(SessionType::Custom, 60_000, "").is_err());
        engine.stop().unwrap();
        assert!(engine.start(SessionType::Custom, 60_000, "").is_ok());
    }

    #[test]
    fn commands_without_session_fail() {
        let (_, _, engine) = engine();
        assert!(matches!(engine.pause(), Err(EngineError::NoSession)));
        assert_eq!(engine.tick().unwrap(), TickOutcome::Finished);
    }

    #[test]
    fn persistence_failure_keeps_transition() {
        let (clock, store, engine) = engine();
        engine.start(SessionType::Custom, 60_000, "").unwrap();
        store.set_failing(true);
        clock.advance_secs(5);
        let paused = engine.pause().unwrap();
        assert_eq!(paused.status(), SessionStatus::Paused);
        assert_eq!(engine.current().unwrap().status(), SessionStatus::Paused);

        store.set_failing(false);
        let stored = store.session(paused.id()).unwrap();
        assert_eq!(stored.status(), SessionStatus::Active);
    }

    #[test]
    fn start_default_uses_type_hint() {
        let (_, _, engine) = engine();
        let record = engine.start_default("").unwrap();
        assert_eq!(record.session_type(), SessionType::Intermittent16_8);
        assert_eq!(record.planned_duration_ms(), 16 * 3_600_000);
    }

    #[test]
    fn discard_stops_ticking_but_keeps_stored_record() {
        let (_, store, engine) = engine();
        let record = engine.start(SessionType::Custom, 60_000, "").unwrap();
        assert_eq!(engine.tick_session(record.id()).unwrap(), TickOutcome::Continue);
        engine.discard();
        assert_eq!(engine.tick_session(record.id()).unwrap(), TickOutcome::Finished);
        assert_eq!(store.fetch_open().unwrap().unwrap().id(), record.id());
    }

    #[test]
    fn builders_keep_the_held_session() {
        let (clock, _, engine) = engine();
        let record = engine.start(SessionType::Custom, 60_000, "").unwrap();

        let config = EngineConfig {
            completion_linger_secs: 0,
            ..Default::default()
        };
        let engine = engine
            .with_config(config)
            .with_listener(Arc::new(NoListener))
            .with_clock(clock.clone());
        assert_eq!(engine.current().unwrap().id(), record.id());

        clock.advance_secs(60);
        assert_eq!(engine.tick().unwrap(), TickOutcome::Completed);
        assert_eq!(engine.config().completion_linger_secs, 0);
    }
}
