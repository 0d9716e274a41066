//! Live status surface.
//!
//! The engine pushes an immutable [`Snapshot`] to two collaborators:
//!
//! - a [`LiveStatusPublisher`], the external "live display" (lock screen,
//!   widget, status bar) with an explicit start/update/end lifecycle
//! - a [`SnapshotListener`], the host application's own refresh hook
//!
//! Display failures never reach the caller. [`LiveDisplay`] logs them and
//! falls back to "no live display" for the affected session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LiveStatusError;
use crate::events::Event;
use crate::session::{accountant, SessionRecord, SessionStatus};

/// Point-in-time summary of a session, derived entirely from the accountant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub session_id: String,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    /// 0.0 .. 1.0
    pub progress: f64,
    pub status: SessionStatus,
    pub is_paused: bool,
}

impl Snapshot {
    pub fn of(record: &SessionRecord, now: DateTime<Utc>) -> Self {
        let remaining_ms = accountant::remaining_ms(record, now);
        Self {
            session_id: record.id().to_string(),
            elapsed_seconds: accountant::elapsed_ms(record, now) / 1000,
            // Round up so a countdown never shows 0 before completion.
            remaining_seconds: remaining_ms.div_ceil(1000),
            progress: accountant::progress(record, now),
            status: record.status(),
            is_paused: record.status() == SessionStatus::Paused,
        }
    }
}

/// How a live display should go away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Immediate,
    /// Keep the final state visible until the given instant.
    AtTime(DateTime<Utc>),
    /// Let the platform decide.
    Default,
}

/// External live display.
///
/// `start` must fail with [`LiveStatusError::AlreadyActive`] when a display
/// for a different session is still up. `update` is a no-op without an
/// active display.
pub trait LiveStatusPublisher: Send + Sync {
    fn start(&self, snapshot: &Snapshot) -> Result<(), LiveStatusError>;
    fn update(&self, snapshot: &Snapshot) -> Result<(), LiveStatusError>;
    fn end(&self, reason: EndReason) -> Result<(), LiveStatusError>;
}

/// Publisher for hosts without a live display.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLiveStatus;

impl LiveStatusPublisher for NoLiveStatus {
    fn start(&self, _snapshot: &Snapshot) -> Result<(), LiveStatusError> {
        Ok(())
    }

    fn update(&self, _snapshot: &Snapshot) -> Result<(), LiveStatusError> {
        Ok(())
    }

    fn end(&self, _reason: EndReason) -> Result<(), LiveStatusError> {
        Ok(())
    }
}

/// Host hook for snapshots and events. Both methods default to no-ops.
pub trait SnapshotListener: Send + Sync {
    fn on_snapshot(&self, _snapshot: &Snapshot) {}
    fn on_event(&self, _event: &Event) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoListener;

impl SnapshotListener for NoListener {}

/// Engine-side bookkeeping for the publisher lifecycle.
pub(crate) struct LiveDisplay {
    publisher: Arc<dyn LiveStatusPublisher>,
    /// Session currently shown by the publisher.
    showing: Option<String>,
}

impl LiveDisplay {
    pub(crate) fn new(publisher: Arc<dyn LiveStatusPublisher>) -> Self {
        Self {
            publisher,
            showing: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn showing(&self) -> Option<&str> {
        self.showing.as_deref()
    }

    /// Start showing `snapshot`'s session, rolling over any stale display.
    pub(crate) fn begin(&mut self, snapshot: &Snapshot) {
        match self.showing.as_deref() {
            Some(id) if id == snapshot.session_id => {
                self.refresh(snapshot);
                return;
            }
            Some(stale) => {
                debug!("Ending stale live display for session {}", stale);
                self.end_quietly(EndReason::Immediate);
            }
            None => {}
        }

        match self.publisher.start(snapshot) {
            Ok(()) => self.showing = Some(snapshot.session_id.clone()),
            Err(LiveStatusError::AlreadyActive { active }) => {
                // Left over from a previous run; roll it over explicitly.
                debug!("Rolling over live display left by session {}", active);
                self.end_quietly(EndReason::Immediate);
                match self.publisher.start(snapshot) {
                    Ok(()) => self.showing = Some(snapshot.session_id.clone()),
                    Err(e) => self.degrade(&snapshot.session_id, &e),
                }
            }
            Err(e) => self.degrade(&snapshot.session_id, &e),
        }
    }

    pub(crate) fn refresh(&mut self, snapshot: &Snapshot) {
        if self.showing.as_deref() != Some(snapshot.session_id.as_str()) {
            return;
        }
        if let Err(e) = self.publisher.update(snapshot) {
            self.degrade(&snapshot.session_id, &e);
        }
    }

    /// Push the final snapshot and take the display down.
    pub(crate) fn finish(&mut self, snapshot: &Snapshot, reason: EndReason) {
        if self.showing.as_deref() != Some(snapshot.session_id.as_str()) {
            return;
        }
        if let Err(e) = self.publisher.update(snapshot) {
            warn!(
                "Live display update failed for session {}: {}",
                snapshot.session_id, e
            );
        }
        self.end_quietly(reason);
    }

    /// Tear down whatever is showing without a final update.
    pub(crate) fn discard(&mut self) {
        if self.showing.is_some() {
            self.end_quietly(EndReason::Immediate);
        }
    }

    fn end_quietly(&mut self, reason: EndReason) {
        if let Err(e) = self.publisher.end(reason) {
            warn!("Failed to end live display: {}", e);
        }
        self.showing = None;
    }

    fn degrade(&mut self, session_id: &str, err: &LiveStatusError) {
        warn!(
            "Live display unavailable for session {}, continuing without it: {}",
            session_id, err
        );
        self.showing = None;
    }
}
