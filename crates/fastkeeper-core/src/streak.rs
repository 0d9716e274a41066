//! Consecutive-day streaks over completed sessions.
//!
//! A qualifying day is a local calendar day holding at least one completed
//! session. The current streak is the length of the unbroken run of
//! qualifying days that ends at the most recent one. Streaks are not expired
//! proactively: a run keeps its stored length until the next completion
//! recomputes it. Use [`StreakRecord::effective_streak`] for a display value
//! that drops to zero once a day has been skipped.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionRecord, SessionStatus};

/// Domain a streak applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Fasting,
    Dieting,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Fasting => "fasting",
            ActivityKind::Dieting => "dieting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub activity_kind: ActivityKind,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Most recent qualifying day; `None` until the first one.
    pub last_activity_date: Option<NaiveDate>,
}

impl StreakRecord {
    pub fn new(activity_kind: ActivityKind) -> Self {
        Self {
            activity_kind,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
        }
    }

    /// Streak as it should be displayed on `today`.
    ///
    /// Returns the stored streak while the last qualifying day is today or
    /// yesterday, and 0 once a full day has been missed. Does not modify the
    /// record.
    pub fn effective_streak(&self, today: NaiveDate) -> u32 {
        match self.last_activity_date {
            Some(last) if (today - last).num_days() <= 1 => self.current_streak,
            _ => 0,
        }
    }
}

/// Recomputes [`StreakRecord`]s from history.
#[derive(Debug, Clone, Copy)]
pub struct StreakTracker {
    offset: FixedOffset,
}

impl StreakTracker {
    /// Tracker whose calendar days are taken at `offset` from UTC.
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Local calendar day of an instant.
    pub fn calendar_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Recompute from session history. Records that are not `Completed` are
    /// ignored; an empty history yields a zero streak.
    pub fn recompute(
        &self,
        previous: Option<&StreakRecord>,
        kind: ActivityKind,
        history: &[SessionRecord],
    ) -> StreakRecord {
        let days = history
            .iter()
            .filter(|record| record.status() == SessionStatus::Completed)
            .map(|record| self.calendar_day(record.start_time()));
        self.recompute_from_days(previous, kind, days)
    }

    /// Recompute from raw qualifying days (duplicates allowed, any order).
    pub fn recompute_from_days(
        &self,
        previous: Option<&StreakRecord>,
        kind: ActivityKind,
        days: impl IntoIterator<Item = NaiveDate>,
    ) -> StreakRecord {
        let mut days: Vec<NaiveDate> = days.into_iter().collect();
        days.sort_unstable_by(|a, b| b.cmp(a));
        days.dedup();

        let current_streak = trailing_run(&days);
        let previous_longest = previous.map(|p| p.longest_streak).unwrap_or(0);

        StreakRecord {
            activity_kind: kind,
            current_streak,
            longest_streak: previous_longest.max(current_streak),
            last_activity_date: days.first().copied(),
        }
    }
}

impl Default for StreakTracker {
    fn default() -> Self {
        Self::utc()
    }
}

/// Length of the consecutive run at the head of a descending, deduped list.
fn trailing_run(days_desc: &[NaiveDate]) -> u32 {
    if days_desc.is_empty() {
        return 0;
    }
    let mut run = 1u32;
    for pair in days_desc.windows(2) {
        if (pair[0] - pair[1]).num_days() == 1 {
            run += 1;
        } else {
            break;
        }
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_history_has_no_streak() {
        let tracker = StreakTracker::utc();
        let record = tracker.recompute(None, ActivityKind::Fasting, &[]);
        assert_eq!(record.current_streak, 0);
        assert_eq!(record.longest_streak, 0);
        assert_eq!(record.last_activity_date, None);
    }

    #[test]
    fn three_consecutive_days() {
        let tracker = StreakTracker::utc();
        let today = day(2026, 3, 10);
        let record = tracker.recompute_from_days(
            None,
            ActivityKind::Fasting,
            [today, today - Duration::days(1), today - Duration::days(2)],
        );
        assert_eq!(record.current_streak, 3);
        assert_eq!(record.longest_streak, 3);
        assert_eq!(record.last_activity_date, Some(today));
    }

    #[test]
    fn gap_breaks_the_run() {
        let tracker = StreakTracker::utc();
        let today = day(2026, 3, 10);
        let record = tracker.recompute_from_days(
            None,
            ActivityKind::Fasting,
            [today, today - Duration::days(2)],
        );
        assert_eq!(record.current_streak, 1);
    }

    #[test]
    fn same_day_counts_once() {
        let tracker = StreakTracker::utc();
        let today = day(2026, 3, 10);
        let record =
            tracker.recompute_from_days(None, ActivityKind::Fasting, [today, today, today]);
        assert_eq!(record.current_streak, 1);
    }

    #[test]
    fn old_run_is_reported_without_expiry() {
        let tracker = StreakTracker::utc();
        let last = day(2026, 1, 5);
        let record = tracker.recompute_from_days(
            None,
            ActivityKind::Fasting,
            [last, last - Duration::days(1)],
        );
        assert_eq!(record.current_streak, 2);
        assert_eq!(record.effective_streak(day(2026, 1, 6)), 2);
        assert_eq!(record.effective_streak(day(2026, 1, 8)), 0);
    }

    #[test]
    fn longest_streak_is_kept() {
        let tracker = StreakTracker::utc();
        let previous = StreakRecord {
            activity_kind: ActivityKind::Fasting,
            current_streak: 5,
            longest_streak: 9,
            last_activity_date: Some(day(2026, 2, 1)),
        };
        let record =
            tracker.recompute_from_days(Some(&previous), ActivityKind::Fasting, [day(2026, 3, 1)]);
        assert_eq!(record.current_streak, 1);
        assert_eq!(record.longest_streak, 9);
    }

    #[test]
    fn calendar_day_respects_offset() {
        let tracker = StreakTracker::new(FixedOffset::west_opt(5 * 3600).unwrap());
        let at = "2026-03-10T03:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(tracker.calendar_day(at), day(2026, 3, 9));
        assert_eq!(StreakTracker::utc().calendar_day(at), day(2026, 3, 10));
    }
}
