//! Volunteer attendance: state, transitions, anomalies and reconciliation.
//!
//! ```text
//! NotCheckedIn ──check_in──▶ CheckedIn ──check_out──▶ CheckedOut
//!                                ▲                        │
//!                                └────────check_in────────┘
//! ```

mod anomaly;
mod cache;
mod lock;
mod machine;
mod transition;
mod types;

pub use anomaly::{format_duration, AnomalyDetector, AnomalyKind, AnomalyReport, DurationSummary};
pub use cache::{CacheSection, PersistedCheckinCache, CHECKIN_CACHE_KEY};
pub use lock::{InFlightGuard, InFlightLocks};
pub use machine::AttendanceMachine;
pub use transition::{close_record, validate_check_in, validate_check_out};
pub use types::{AttendanceRecord, AttendanceState, AttendanceStatus};
