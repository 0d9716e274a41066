//! Pause-aware time accounting.
//!
//! Everything here is a pure function of a [`SessionRecord`] and a wall-clock
//! instant. Nothing accumulates across calls, so an arbitrarily long gap
//! between samples is accounted for in one step.

use chrono::{DateTime, Utc};

use super::record::{SessionRecord, SessionStatus};
use crate::clock::millis_between;

/// Accounted fasting time in milliseconds.
///
/// - Active: `now - start - paused`
/// - Paused: frozen at `paused_at - start - paused`
/// - Terminal: the recorded `actual_duration`
pub fn elapsed_ms(record: &SessionRecord, now: DateTime<Utc>) -> u64 {
    match record.status {
        SessionStatus::Active => {
            millis_between(record.start_time, now).saturating_sub(record.total_paused_ms)
        }
        SessionStatus::Paused => {
            let frozen_at = record.paused_at.unwrap_or(now);
            millis_between(record.start_time, frozen_at).saturating_sub(record.total_paused_ms)
        }
        SessionStatus::Completed | SessionStatus::Stopped => {
            record.actual_duration_ms.unwrap_or(0)
        }
    }
}

pub fn remaining_ms(record: &SessionRecord, now: DateTime<Utc>) -> u64 {
    record
        .planned_duration_ms
        .saturating_sub(elapsed_ms(record, now))
}

/// 0.0 .. 1.0 progress toward the planned duration.
pub fn progress(record: &SessionRecord, now: DateTime<Utc>) -> f64 {
    let planned = record.planned_duration_ms;
    if planned == 0 {
        return 0.0;
    }
    let elapsed = elapsed_ms(record, now);
    if elapsed >= planned {
        return 1.0;
    }
    (elapsed as f64 / planned as f64).clamp(0.0, 1.0)
}

/// Whether the planned duration has been reached.
pub fn is_due(record: &SessionRecord, now: DateTime<Utc>) -> bool {
    elapsed_ms(record, now) >= record.planned_duration_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionType;
    use chrono::Duration;
    use proptest::prelude::*;

    fn record_at(start: DateTime<Utc>, planned_ms: u64) -> SessionRecord {
        SessionRecord {
            id: "acct".into(),
            session_type: SessionType::Custom,
            planned_duration_ms: planned_ms,
            start_time: start,
            paused_at: None,
            total_paused_ms: 0,
            end_time: None,
            actual_duration_ms: None,
            status: SessionStatus::Active,
            notes: String::new(),
        }
    }

    #[test]
    fn active_elapsed_subtracts_paused_time() {
        let t0 = Utc::now();
        let mut record = record_at(t0, 3_600_000);
        record.total_paused_ms = 100_000;
        let now = t0 + Duration::seconds(4000);
        assert_eq!(elapsed_ms(&record, now), 3_900_000);
        assert_eq!(remaining_ms(&record, now), 0);
        assert_eq!(progress(&record, now), 1.0);
        assert!(is_due(&record, now));
    }

    #[test]
    fn paused_elapsed_is_frozen() {
        let t0 = Utc::now();
        let mut record = record_at(t0, 3_600_000);
        record.status = SessionStatus::Paused;
        record.paused_at = Some(t0 + Duration::seconds(100));
        let a = elapsed_ms(&record, t0 + Duration::seconds(150));
        let b = elapsed_ms(&record, t0 + Duration::days(3));
        assert_eq!(a, 100_000);
        assert_eq!(a, b);
    }

    #[test]
    fn terminal_elapsed_ignores_now() {
        let t0 = Utc::now();
        let mut record = record_at(t0, 60_000);
        record.status = SessionStatus::Stopped;
        record.end_time = Some(t0 + Duration::seconds(30));
        record.actual_duration_ms = Some(30_000);
        assert_eq!(elapsed_ms(&record, t0 + Duration::days(10)), 30_000);
        assert_eq!(remaining_ms(&record, t0 + Duration::days(10)), 30_000);
        assert_eq!(progress(&record, t0), 0.5);
    }

    #[test]
    fn clock_before_start_reads_zero() {
        let t0 = Utc::now();
        let record = record_at(t0, 60_000);
        assert_eq!(elapsed_ms(&record, t0 - Duration::seconds(30)), 0);
        assert_eq!(progress(&record, t0 - Duration::seconds(30)), 0.0);
    }

    proptest! {
        #[test]
        fn elapsed_is_monotonic_while_active(
            paused_ms in 0u64..1_000_000,
            a in 0i64..10_000_000,
            b in 0i64..10_000_000,
        ) {
            let t0 = Utc::now();
            let mut record = record_at(t0, 3_600_000);
            record.total_paused_ms = paused_ms;
            let (t1, t2) = if a <= b { (a, b) } else { (b, a) };
            let e1 = elapsed_ms(&record, t0 + Duration::milliseconds(t1));
            let e2 = elapsed_ms(&record, t0 + Duration::milliseconds(t2));
            prop_assert!(e2 >= e1);
        }

        #[test]
        fn progress_stays_in_bounds(
            planned_ms in 1u64..100_000_000,
            offset_ms in -10_000_000i64..200_000_000,
        ) {
            let t0 = Utc::now();
            let record = record_at(t0, planned_ms);
            let now = t0 + Duration::milliseconds(offset_ms);
            let p = progress(&record, now);
            prop_assert!((0.0..=1.0).contains(&p));
            prop_assert_eq!(p == 1.0, elapsed_ms(&record, now) >= planned_ms);
        }
    }
}
