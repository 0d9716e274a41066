use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HOUR_MS: u64 = 60 * 60 * 1000;

/// Fasting protocol chosen by the user.
///
/// Only carries a planned-duration hint and display metadata; the engine
/// treats every type the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// 16 hours fasting, 8 hour eating window
    Intermittent16_8,
    /// 18 hours fasting, 6 hour eating window
    Intermittent18_6,
    /// One meal a day
    Omad,
    /// Full 24 hour fast
    Extended24,
    /// Multi-day water fast
    Water,
    /// User-defined length
    Custom,
}

impl SessionType {
    /// Suggested planned duration in milliseconds, if the type has one.
    pub fn planned_duration_hint_ms(&self) -> Option<u64> {
        match self {
            SessionType::Intermittent16_8 => Some(16 * HOUR_MS),
            SessionType::Intermittent18_6 => Some(18 * HOUR_MS),
            SessionType::Omad => Some(23 * HOUR_MS),
            SessionType::Extended24 => Some(24 * HOUR_MS),
            SessionType::Water => Some(72 * HOUR_MS),
            SessionType::Custom => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SessionType::Intermittent16_8 => "16:8 Intermittent",
            SessionType::Intermittent18_6 => "18:6 Intermittent",
            SessionType::Omad => "One Meal a Day",
            SessionType::Extended24 => "24-Hour Fast",
            SessionType::Water => "Water Fast",
            SessionType::Custom => "Custom Fast",
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SessionType::Intermittent16_8 => "intermittent_16_8",
            SessionType::Intermittent18_6 => "intermittent_18_6",
            SessionType::Omad => "omad",
            SessionType::Extended24 => "extended_24",
            SessionType::Water => "water",
            SessionType::Custom => "custom",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "intermittent_16_8" => Some(SessionType::Intermittent16_8),
            "intermittent_18_6" => Some(SessionType::Intermittent18_6),
            "omad" => Some(SessionType::Omad),
            "extended_24" => Some(SessionType::Extended24),
            "water" => Some(SessionType::Water),
            "custom" => Some(SessionType::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Stopped)
    }

    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Stopped => "stopped",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "paused" => Some(SessionStatus::Paused),
            "completed" => Some(SessionStatus::Completed),
            "stopped" => Some(SessionStatus::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fasting session.
///
/// Timing fields are only written by [`SessionStateMachine`](super::SessionStateMachine);
/// everything else reads them through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub(crate) id: String,
    pub(crate) session_type: SessionType,
    pub(crate) planned_duration_ms: u64,
    pub(crate) start_time: DateTime<Utc>,
    #[serde(default)]
    pub(crate) paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) total_paused_ms: u64,
    #[serde(default)]
    pub(crate) end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) actual_duration_ms: Option<u64>,
    pub(crate) status: SessionStatus,
    #[serde(default)]
    pub(crate) notes: String,
}

impl SessionRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn planned_duration_ms(&self) -> u64 {
        self.planned_duration_ms
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        self.paused_at
    }

    pub fn total_paused_ms(&self) -> u64 {
        self.total_paused_ms
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn actual_duration_ms(&self) -> Option<u64> {
        self.actual_duration_ms
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Validate the field-level invariants that must hold at every
    /// observable instant. Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        if self.planned_duration_ms == 0 {
            return Err("planned duration must be positive");
        }
        if self.paused_at.is_some() != (self.status == SessionStatus::Paused) {
            return Err("paused_at must be set exactly when status is paused");
        }
        let terminal = self.status.is_terminal();
        if self.end_time.is_some() != terminal {
            return Err("end_time must be set exactly when status is terminal");
        }
        if self.actual_duration_ms.is_some() != terminal {
            return Err("actual_duration must be set exactly when status is terminal");
        }
        if let Some(paused_at) = self.paused_at {
            if paused_at < self.start_time {
                return Err("paused_at precedes start_time");
            }
        }
        Ok(())
    }
}
