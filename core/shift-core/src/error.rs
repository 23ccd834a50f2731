//! Error types for shift-core operations.
//!
//! Domain errors are small typed enums so callers can match on the reason and
//! offer the right corrective action. `ShiftError` covers ambient failures
//! (config, files, JSON).

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Timestamp Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("Unparsable timestamp: {raw:?}")]
    UnparsableTimestamp { raw: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Attendance Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Rejected transitions and transient failures of the submission flow.
///
/// Validation variants never change state. `Service` means a collaborator
/// failed and local state was left as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttendanceError {
    #[error("Worker {worker_id} is already checked in")]
    AlreadyCheckedIn { worker_id: u64 },

    #[error("Worker {worker_id} has no open attendance record")]
    NoOpenRecord { worker_id: u64 },

    #[error("Worker {worker_id} is not currently checked in")]
    NotCurrentlyCheckedIn { worker_id: u64 },

    #[error("Check-out at {end} precedes check-in at {start}")]
    InvertedInterval {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    #[error("Another operation for worker {worker_id} is in flight")]
    OperationInFlight { worker_id: u64 },

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity code could not be parsed: {reason}")]
    Unparsable { reason: String },

    #[error("Identity code digest does not match worker {worker_id}")]
    Tampered { worker_id: u64 },

    #[error("No identity found for worker {worker_id}")]
    NotFound { worker_id: u64 },

    #[error("Identity lookup failed: {0}")]
    Lookup(#[from] ServiceError),
}

impl IdentityError {
    pub(crate) fn unparsable(reason: impl Into<String>) -> Self {
        IdentityError::Unparsable {
            reason: reason.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Transient failure of an external collaborator (network or storage).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend rejected request (code {code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("Storage failure: {0}")]
    Storage(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Crate Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Ambient errors from configuration and file handling.
#[derive(Debug, thiserror::Error)]
pub enum ShiftError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration value: {field}: {details}")]
    InvalidConfig { field: String, details: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using ShiftError.
pub type Result<T> = std::result::Result<T, ShiftError>;

impl From<ShiftError> for String {
    fn from(err: ShiftError) -> String {
        err.to_string()
    }
}

impl From<ShiftError> for ServiceError {
    fn from(err: ShiftError) -> Self {
        ServiceError::Storage(err.to_string())
    }
}
