//! Transition rules for attendance state.
//! `CheckedOut` counts as "not checked in" for a new check-in.

use chrono::{DateTime, Utc};

use super::types::{AttendanceRecord, AttendanceState, AttendanceStatus};
use crate::error::AttendanceError;

pub fn validate_check_in(state: &AttendanceState) -> Result<(), AttendanceError> {
    match state.status {
        AttendanceStatus::CheckedIn => Err(AttendanceError::AlreadyCheckedIn {
            worker_id: state.worker_id,
        }),
        AttendanceStatus::NotCheckedIn | AttendanceStatus::CheckedOut => Ok(()),
    }
}

/// Returns the record a check-out would close.
pub fn validate_check_out(state: &AttendanceState) -> Result<&AttendanceRecord, AttendanceError> {
    match (state.status, state.current_open_record.as_ref()) {
        (AttendanceStatus::CheckedIn, Some(record)) => Ok(record),
        (AttendanceStatus::CheckedIn, None) | (AttendanceStatus::NotCheckedIn, _) => {
            Err(AttendanceError::NoOpenRecord {
                worker_id: state.worker_id,
            })
        }
        (AttendanceStatus::CheckedOut, _) => Err(AttendanceError::NotCurrentlyCheckedIn {
            worker_id: state.worker_id,
        }),
    }
}

/// Closes `record` at `end`. Duration is whole minutes, rounded down.
pub fn close_record(
    record: &AttendanceRecord,
    end: DateTime<Utc>,
) -> Result<AttendanceRecord, AttendanceError> {
    if end < record.start {
        return Err(AttendanceError::InvertedInterval {
            start: record.start,
            end,
        });
    }
    let mut closed = record.clone();
    closed.end = Some(end);
    closed.duration_minutes = Some((end - record.start).num_minutes());
    Ok(closed)
}
