//! Advisory checks on attendance state.
//!
//! Nothing here blocks a transition. Reports exist so a caller can offer a
//! corrective action such as resetting a stuck check-in.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::types::{AttendanceRecord, AttendanceState};
use crate::config::ShiftConfig;

const PLAUSIBLE_PAST_DAYS: i64 = 30;
const PLAUSIBLE_FUTURE_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    FutureCheckIn,
    ExcessiveDuration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyReport {
    pub worker_id: u64,
    pub kind: AnomalyKind,
    pub start: DateTime<Utc>,
    /// Negative for future check-ins.
    pub elapsed_minutes: i64,
}

impl std::fmt::Display for AnomalyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            AnomalyKind::FutureCheckIn => {
                write!(f, "check-in time {} is in the future", self.start)
            }
            AnomalyKind::ExcessiveDuration => write!(
                f,
                "checked in for {}, which looks stuck",
                format_duration(self.elapsed_minutes)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationSummary {
    pub minutes: i64,
    pub is_overtime: bool,
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    max_shift: Duration,
    overtime: Duration,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::from_config(&ShiftConfig::default())
    }
}

impl AnomalyDetector {
    pub fn new(max_shift: Duration, overtime: Duration) -> Self {
        Self {
            max_shift,
            overtime,
        }
    }

    pub fn from_config(config: &ShiftConfig) -> Self {
        Self::new(config.max_shift(), config.overtime())
    }

    /// Checks the open record, if any. A future start wins over duration.
    pub fn check(&self, state: &AttendanceState, now: DateTime<Utc>) -> Option<AnomalyReport> {
        let record = state.current_open_record.as_ref()?;
        let elapsed = now - record.start;

        let kind = if record.start > now {
            AnomalyKind::FutureCheckIn
        } else if elapsed > self.max_shift {
            AnomalyKind::ExcessiveDuration
        } else {
            return None;
        };

        Some(AnomalyReport {
            worker_id: record.worker_id,
            kind,
            start: record.start,
            elapsed_minutes: elapsed.num_minutes(),
        })
    }

    /// Within the last 30 days and at most an hour ahead.
    pub fn is_plausible(&self, instant: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        instant >= now - Duration::days(PLAUSIBLE_PAST_DAYS)
            && instant <= now + Duration::hours(PLAUSIBLE_FUTURE_HOURS)
    }

    /// Cached check-ins older than the shift ceiling are not restored.
    pub fn is_expired(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - start > self.max_shift
    }

    /// Capped end for an open record that has run past the overtime limit.
    /// The session is closed at `start + overtime`, not at `now`.
    pub fn overtime_end(
        &self,
        record: &AttendanceRecord,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if record.is_open() && record.elapsed(now) > self.overtime {
            Some(record.start + self.overtime)
        } else {
            None
        }
    }

    /// Summary for a closed record.
    pub fn summarize(&self, record: &AttendanceRecord) -> Option<DurationSummary> {
        let minutes = record.duration_minutes?;
        Some(DurationSummary {
            minutes,
            is_overtime: minutes >= self.overtime.num_minutes(),
        })
    }
}

/// `"8h 30m"`, `"45m"`, `"<1m"`.
pub fn format_duration(minutes: i64) -> String {
    if minutes < 1 {
        return "<1m".to_string();
    }
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours == 0 {
        format!("{}m", rest)
    } else {
        format!("{}h {}m", hours, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::transition::close_record;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 20, 0, 0).unwrap()
    }

    fn checked_in_at(start: DateTime<Utc>) -> AttendanceState {
        AttendanceState::checked_in(AttendanceRecord::open(3, start), None)
    }

    #[test]
    fn test_no_report_for_normal_shift() {
        let state = checked_in_at(now() - Duration::hours(4));
        assert_eq!(AnomalyDetector::default().check(&state, now()), None);
    }

    #[test]
    fn test_no_report_without_open_record() {
        let state = AttendanceState::not_checked_in(3);
        assert_eq!(AnomalyDetector::default().check(&state, now()), None);
    }

    #[test]
    fn test_future_check_in() {
        let state = checked_in_at(now() + Duration::minutes(10));
        let report = AnomalyDetector::default().check(&state, now()).unwrap();
        assert_eq!(report.kind, AnomalyKind::FutureCheckIn);
        assert_eq!(report.elapsed_minutes, -10);
    }

    #[test]
    fn test_excessive_duration_is_strictly_over_ceiling() {
        let detector = AnomalyDetector::default();
        let at_ceiling = checked_in_at(now() - Duration::hours(24));
        let over = checked_in_at(now() - Duration::hours(24) - Duration::minutes(1));

        assert_eq!(detector.check(&at_ceiling, now()), None);
        assert_eq!(
            detector.check(&over, now()).map(|r| r.kind),
            Some(AnomalyKind::ExcessiveDuration)
        );
    }

    #[test]
    fn test_configured_ceiling() {
        let detector = AnomalyDetector::new(Duration::hours(10), Duration::hours(8));
        let state = checked_in_at(now() - Duration::hours(11));
        assert!(detector.check(&state, now()).is_some());
    }

    #[test]
    fn test_plausibility_window() {
        let detector = AnomalyDetector::default();
        assert!(detector.is_plausible(now() - Duration::days(29), now()));
        assert!(detector.is_plausible(now() + Duration::minutes(59), now()));
        assert!(!detector.is_plausible(now() - Duration::days(31), now()));
        assert!(!detector.is_plausible(now() + Duration::hours(2), now()));
    }

    #[test]
    fn test_summary_flags_overtime() {
        let detector = AnomalyDetector::default();
        let open = AttendanceRecord::open(3, now() - Duration::hours(13));
        let long = close_record(&open, now()).unwrap();
        let short = close_record(&open, open.start + Duration::minutes(45)).unwrap();

        assert_eq!(
            detector.summarize(&long),
            Some(DurationSummary {
                minutes: 780,
                is_overtime: true
            })
        );
        assert!(!detector.summarize(&short).unwrap().is_overtime);
        assert_eq!(detector.summarize(&open), None);
    }

    #[test]
    fn test_restore_expiry_uses_shift_ceiling() {
        let detector = AnomalyDetector::default();
        assert!(!detector.is_expired(now() - Duration::hours(24), now()));
        assert!(detector.is_expired(now() - Duration::hours(30), now()));
    }

    #[test]
    fn test_overtime_end_is_capped_at_limit() {
        let detector = AnomalyDetector::default();
        let open = AttendanceRecord::open(3, now() - Duration::hours(13));
        assert_eq!(
            detector.overtime_end(&open, now()),
            Some(open.start + Duration::hours(12))
        );

        let at_limit = AttendanceRecord::open(3, now() - Duration::hours(12));
        assert_eq!(detector.overtime_end(&at_limit, now()), None);

        let closed = close_record(&open, now()).unwrap();
        assert_eq!(detector.overtime_end(&closed, now()), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(510), "8h 30m");
        assert_eq!(format_duration(45), "45m");
        assert_eq!(format_duration(0), "<1m");
        assert_eq!(format_duration(120), "2h 0m");
    }
}
