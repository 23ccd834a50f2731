use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One open-or-closed work interval for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub worker_id: u64,
    /// Server record id, unknown for optimistic local records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<u64>,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    /// Un-resolved timestamp strings this record was built from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_raw: Vec<String>,
}

impl AttendanceRecord {
    pub fn open(worker_id: u64, start: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            record_id: None,
            start,
            end: None,
            duration_minutes: None,
            source_raw: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Time since `start`, negative when `start` lies after `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end.unwrap_or(now) - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    NotCheckedIn,
    CheckedIn,
    CheckedOut,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AttendanceStatus::NotCheckedIn => "not checked in",
            AttendanceStatus::CheckedIn => "checked in",
            AttendanceStatus::CheckedOut => "checked out",
        };
        f.write_str(label)
    }
}

/// Cached per-worker view.
///
/// `current_open_record` is present iff `status` is `CheckedIn`. Build values
/// through the constructors to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceState {
    pub worker_id: u64,
    pub status: AttendanceStatus,
    pub current_open_record: Option<AttendanceRecord>,
    /// Most recent closed record, kept after check-out for display.
    pub last_closed_record: Option<AttendanceRecord>,
}

impl AttendanceState {
    pub fn not_checked_in(worker_id: u64) -> Self {
        Self {
            worker_id,
            status: AttendanceStatus::NotCheckedIn,
            current_open_record: None,
            last_closed_record: None,
        }
    }

    pub fn checked_in(record: AttendanceRecord, last_closed: Option<AttendanceRecord>) -> Self {
        Self {
            worker_id: record.worker_id,
            status: AttendanceStatus::CheckedIn,
            current_open_record: Some(record),
            last_closed_record: last_closed,
        }
    }

    pub fn checked_out(record: AttendanceRecord) -> Self {
        Self {
            worker_id: record.worker_id,
            status: AttendanceStatus::CheckedOut,
            current_open_record: None,
            last_closed_record: Some(record),
        }
    }

    pub fn is_checked_in(&self) -> bool {
        self.status == AttendanceStatus::CheckedIn
    }
}
