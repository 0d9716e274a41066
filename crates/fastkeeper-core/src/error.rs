//! Core error types for fastkeeper-core.
//!
//! Errors are split by concern: caller mistakes against the session state
//! machine ([`EngineError`]), storage failures ([`PersistenceError`]), live
//! display failures ([`LiveStatusError`]) and configuration I/O
//! ([`ConfigError`]).

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionStatus;

/// Operations that can be attempted against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Pause,
    Resume,
    Stop,
    Complete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Stop => "stop",
            Operation::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Errors returned synchronously to the caller of an engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Planned duration was zero.
    #[error("Invalid planned duration: must be greater than zero")]
    InvalidDuration,

    /// The operation is not permitted from the session's current status.
    #[error("Cannot {op} a session that is {from}")]
    IllegalTransition { op: Operation, from: SessionStatus },

    /// A session is already active or paused.
    #[error("Session {id} is still in progress; stop it before starting another")]
    SessionInProgress { id: String },

    /// No live session is held by the engine.
    #[error("No session in progress")]
    NoSession,

    /// Completion was computed for a record that is not active. Indicates a bug.
    #[error("Completion detector invariant violated for session {id}: status was {status}")]
    DetectorInvariantViolation { id: String, status: SessionStatus },

    /// Storage failure surfaced from a read path (writes are logged, not returned).
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Storage-collaborator errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to open the database file
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored row could not be turned back into a valid record
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    /// Store rejected the write for another reason
    #[error("{0}")]
    Unavailable(String),
}

/// Failures reported by a live status display.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveStatusError {
    /// A display is already showing another session.
    #[error("Live display already active for session {active}")]
    AlreadyActive { active: String },

    /// The platform refused to show the display.
    #[error("Live display unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Home/config directory could not be prepared
    #[error("Config directory unavailable: {0}")]
    DirUnavailable(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    PersistenceError::Locked
                } else {
                    PersistenceError::QueryFailed(err.to_string())
                }
            }
            _ => PersistenceError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_message_names_operation_and_status() {
        let err = EngineError::IllegalTransition {
            op: Operation::Pause,
            from: SessionStatus::Stopped,
        };
        assert_eq!(err.to_string(), "Cannot pause a session that is stopped");
    }

    #[test]
    fn rusqlite_errors_map_to_query_failed() {
        let err: PersistenceError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, PersistenceError::QueryFailed(_)));
    }
}
