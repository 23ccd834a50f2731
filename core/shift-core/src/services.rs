//! Seams to external collaborators.
//!
//! The core owns no wire protocol. A backend client implements
//! [`RecordLookup`], [`SubmissionService`] and [`IdentityLookup`]; a platform
//! storage adapter implements [`KeyValueStore`]. All of them are async because
//! each call is a suspension point on the platform side.

#![allow(async_fn_in_trait)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, Utc};
use shift_protocol::{ServerRecordDto, SubmissionDto, SubmissionKind};

use crate::error::ServiceError;
use crate::identity::IdentityRecord;
use crate::time::format_fixed;

// ═══════════════════════════════════════════════════════════════════════════════
// Backend
// ═══════════════════════════════════════════════════════════════════════════════

pub trait RecordLookup {
    /// Most recent attendance record for the worker, open or closed.
    async fn last_attendance_record(
        &self,
        worker_id: u64,
    ) -> Result<Option<ServerRecordDto>, ServiceError>;
}

pub trait IdentityLookup {
    async fn identity(&self, worker_id: u64) -> Result<Option<IdentityRecord>, ServiceError>;
}

/// A check-in or check-out to send to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub kind: SubmissionKind,
    pub worker_id: u64,
    pub operator_id: u64,
    pub at: DateTime<Utc>,
}

impl Submission {
    /// Wire form, with `at` rendered in the backend's fixed offset.
    pub fn to_dto(&self, offset: FixedOffset) -> SubmissionDto {
        SubmissionDto {
            kind: self.kind,
            user_id: self.worker_id,
            operate_user_id: self.operator_id,
            time: format_fixed(self.at, offset),
            remark: None,
        }
    }
}

pub trait SubmissionService {
    async fn submit(&self, submission: &Submission) -> Result<(), ServiceError>;
}

impl<T: RecordLookup> RecordLookup for Arc<T> {
    async fn last_attendance_record(
        &self,
        worker_id: u64,
    ) -> Result<Option<ServerRecordDto>, ServiceError> {
        (**self).last_attendance_record(worker_id).await
    }
}

impl<T: IdentityLookup> IdentityLookup for Arc<T> {
    async fn identity(&self, worker_id: u64) -> Result<Option<IdentityRecord>, ServiceError> {
        (**self).identity(worker_id).await
    }
}

impl<T: SubmissionService> SubmissionService for Arc<T> {
    async fn submit(&self, submission: &Submission) -> Result<(), ServiceError> {
        (**self).submit(submission).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Key-Value Persistence
// ═══════════════════════════════════════════════════════════════════════════════

pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError>;
    async fn set(&self, key: &str, value: String) -> Result<(), ServiceError>;
    async fn remove(&self, key: &str) -> Result<(), ServiceError>;
    async fn keys(&self) -> Result<Vec<String>, ServiceError>;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), ServiceError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), ServiceError> {
        (**self).remove(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, ServiceError> {
        (**self).keys().await
    }
}

/// Process-local store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), ServiceError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ServiceError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.entries().keys().cloned().collect())
    }
}
