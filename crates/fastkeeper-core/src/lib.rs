//! # Fastkeeper Core Library
//!
//! Core logic for tracking timed fasting sessions: starting, pausing,
//! resuming, stopping and automatically completing them, keeping a live
//! status display in sync, and maintaining consecutive-day streaks.
//!
//! ## Architecture
//!
//! - **Session engine**: a wall-clock state machine. Elapsed time is always
//!   recomputed from timestamps, so suspension and missed ticks cost nothing
//! - **Completion detector**: a periodic tick that completes a session once
//!   its planned duration is reached, exactly once
//! - **Live status**: snapshots pushed to an optional external display and a
//!   host listener
//! - **Storage**: SQLite-based session and streak storage, TOML-based
//!   configuration
//!
//! ## Key Components
//!
//! - [`FastingEngine`]: the facade hosts talk to
//! - [`SessionStateMachine`]: lifecycle transitions on a [`SessionRecord`]
//! - [`StreakTracker`]: consecutive-day streaks from session history
//! - [`Database`]: durable [`SessionStore`]

pub mod clock;
pub mod detector;
pub mod engine;
pub mod error;
pub mod events;
pub mod live;
pub mod session;
pub mod stats;
pub mod storage;
pub mod streak;

pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::{spawn_detector, CompletionDetector, DetectorHandle, TickDecision, TickOutcome};
pub use engine::FastingEngine;
pub use error::{ConfigError, EngineError, LiveStatusError, Operation, PersistenceError};
pub use events::Event;
pub use live::{EndReason, LiveStatusPublisher, NoListener, NoLiveStatus, Snapshot, SnapshotListener};
pub use session::{SessionRecord, SessionStateMachine, SessionStatus, SessionType};
pub use stats::FastingStats;
pub use storage::{Database, EngineConfig, MemoryStore, SessionStore};
pub use streak::{ActivityKind, StreakRecord, StreakTracker};
