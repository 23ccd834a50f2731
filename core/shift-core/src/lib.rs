//! # shift-core
//!
//! Core library for volunteer shift tracking: check-in/check-out state,
//! timestamp resolution, scanned identity codes and session diagnostics.
//!
//! ## Design Principles
//!
//! - **No runtime dependency**: collaborator traits use `async fn`; callers
//!   pick the executor.
//! - **Server wins**: local state is optimistic and replaced on reconcile.
//! - **Typed outcomes**: rejected transitions and tamper checks are error
//!   values, never panics.
//! - **Graceful degradation**: missing or corrupt files load as defaults.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shift_core::{AttendanceMachine, SystemClock, TimestampResolver};
//!
//! let machine = AttendanceMachine::new(backend.clone(), backend, store, resolver, clock);
//! machine.restore().await?;
//! let state = machine.check_in(worker_id, operator_id, clock.now()).await?;
//! ```

pub mod attendance;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod patterns;
pub mod services;
pub mod storage;
pub mod store;
pub mod time;

pub use attendance::{
    format_duration, AnomalyDetector, AnomalyKind, AnomalyReport, AttendanceMachine,
    AttendanceRecord, AttendanceState, AttendanceStatus, CacheSection, DurationSummary,
    PersistedCheckinCache, CHECKIN_CACHE_KEY,
};
pub use clock::{Clock, FixedClock, LocalWallClock, SystemClock};
pub use config::{load_config, save_config, ShiftConfig};
pub use diagnostics::{Conflict, ConflictDiagnostics, TimerGuard, TimerRegistry};
pub use error::{
    AttendanceError, IdentityError, Result, ServiceError, ShiftError, TimestampError,
};
pub use identity::{
    issue_hash_code, DigestScheme, EncodingVersion, IdentityHashVerifier, IdentityPayload,
    IdentityRecord, ScannedCode,
};
pub use services::{
    IdentityLookup, KeyValueStore, MemoryStore, RecordLookup, Submission, SubmissionService,
};
pub use storage::StorageConfig;
pub use store::FileStore;
pub use time::{
    format_fixed, Interpretation, InterpretationLog, RawTimestamp, Resolution, TimestampResolver,
};
