//! Authoritative per-worker attendance state.
//!
//! ## Flow
//!
//! ```text
//! check_in / check_out
//!   lock worker → validate → submit → optimistic apply → fetch → reconcile
//! refresh
//!   fetch → reconcile
//! ```
//!
//! The server always wins. Each reconcile bumps the worker's epoch; an
//! optimistic write that started under an older epoch is dropped so it cannot
//! overwrite a newer reconciled state. Cache writes run inside the cache's
//! async section and re-check the epoch there. The state mutex is never held
//! across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SubsecRound, Utc};
use shift_protocol::{ServerRecordDto, SubmissionKind};

use super::anomaly::{AnomalyDetector, AnomalyReport};
use super::cache::PersistedCheckinCache;
use super::lock::{InFlightGuard, InFlightLocks};
use super::transition::{close_record, validate_check_in, validate_check_out};
use super::types::{AttendanceRecord, AttendanceState, AttendanceStatus};
use crate::clock::Clock;
use crate::error::{AttendanceError, ServiceError, TimestampError};
use crate::services::{KeyValueStore, RecordLookup, Submission, SubmissionService};
use crate::time::TimestampResolver;

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<u64, AttendanceState>,
    epochs: HashMap<u64, u64>,
}

impl Inner {
    fn epoch(&self, worker_id: u64) -> u64 {
        self.epochs.get(&worker_id).copied().unwrap_or(0)
    }
}

pub struct AttendanceMachine<L, S, K> {
    lookup: L,
    submitter: S,
    cache: PersistedCheckinCache<K>,
    resolver: TimestampResolver,
    detector: AnomalyDetector,
    clock: Arc<dyn Clock>,
    locks: InFlightLocks,
    inner: Mutex<Inner>,
}

impl<L, S, K> AttendanceMachine<L, S, K>
where
    L: RecordLookup,
    S: SubmissionService,
    K: KeyValueStore,
{
    pub fn new(
        lookup: L,
        submitter: S,
        store: K,
        resolver: TimestampResolver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lookup,
            submitter,
            cache: PersistedCheckinCache::new(store),
            resolver,
            detector: AnomalyDetector::default(),
            clock,
            locks: InFlightLocks::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_detector(mut self, detector: AnomalyDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn resolver(&self) -> &TimestampResolver {
        &self.resolver
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn cache(&self) -> &PersistedCheckinCache<K> {
        &self.cache
    }

    pub fn is_in_flight(&self, worker_id: u64) -> bool {
        self.locks.is_held(worker_id)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Cached view, `NotCheckedIn` for unknown workers.
    pub fn state(&self, worker_id: u64) -> AttendanceState {
        self.inner()
            .states
            .get(&worker_id)
            .cloned()
            .unwrap_or_else(|| AttendanceState::not_checked_in(worker_id))
    }

    pub fn check(&self, worker_id: u64) -> Option<AnomalyReport> {
        self.detector.check(&self.state(worker_id), self.clock.now())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Local Transitions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens a record locally and caches its start. Busy workers are rejected
    /// as already checked in. A failed cache write leaves state unchanged.
    pub async fn apply_check_in(
        &self,
        worker_id: u64,
        start: DateTime<Utc>,
    ) -> Result<AttendanceState, AttendanceError> {
        let _guard = self.lock_for_check_in(worker_id)?;
        validate_check_in(&self.state(worker_id))?;
        let epoch = self.inner().epoch(worker_id);
        let next = self.opened(worker_id, start);
        Ok(self.commit_optimistic(next, epoch).await?)
    }

    /// Closes the open record locally. `end` before the start, or a failed
    /// cache write, leaves state unchanged.
    pub async fn apply_check_out(
        &self,
        worker_id: u64,
        end: DateTime<Utc>,
    ) -> Result<AttendanceState, AttendanceError> {
        let _guard = self.lock_for(worker_id)?;
        let closed = close_record(validate_check_out(&self.state(worker_id))?, end)?;
        let epoch = self.inner().epoch(worker_id);
        Ok(self
            .commit_optimistic(AttendanceState::checked_out(closed), epoch)
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Submission Flow
    // ─────────────────────────────────────────────────────────────────────────────

    /// `at` is truncated to whole seconds, the precision the backend keeps.
    pub async fn check_in(
        &self,
        worker_id: u64,
        operator_id: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceState, AttendanceError> {
        let at = at.trunc_subsecs(0);
        let _guard = self.lock_for_check_in(worker_id)?;
        validate_check_in(&self.state(worker_id))?;
        let epoch = self.inner().epoch(worker_id);

        self.submitter
            .submit(&Submission {
                kind: SubmissionKind::CheckIn,
                worker_id,
                operator_id,
                at,
            })
            .await?;
        tracing::info!(worker_id, operator_id, at = %at, "Check-in submitted");

        self.commit_accepted(self.opened(worker_id, at), epoch).await;
        Ok(self.confirm(worker_id).await)
    }

    /// `at` is truncated to whole seconds, the precision the backend keeps.
    pub async fn check_out(
        &self,
        worker_id: u64,
        operator_id: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceState, AttendanceError> {
        let at = at.trunc_subsecs(0);
        let _guard = self.lock_for(worker_id)?;
        let closed = close_record(validate_check_out(&self.state(worker_id))?, at)?;
        let epoch = self.inner().epoch(worker_id);

        self.submitter
            .submit(&Submission {
                kind: SubmissionKind::CheckOut,
                worker_id,
                operator_id,
                at,
            })
            .await?;
        tracing::info!(
            worker_id,
            operator_id,
            at = %at,
            minutes = ?closed.duration_minutes,
            "Check-out submitted"
        );

        self.commit_accepted(AttendanceState::checked_out(closed), epoch)
            .await;
        Ok(self.confirm(worker_id).await)
    }

    /// Checks out a session that ran past the overtime limit, ending it at
    /// `start + overtime`. Returns `None` when the server shows no such
    /// session.
    pub async fn auto_check_out(
        &self,
        worker_id: u64,
        operator_id: u64,
    ) -> Result<Option<AttendanceState>, AttendanceError> {
        let state = self.refresh(worker_id).await?;
        let Some(open) = state.current_open_record else {
            return Ok(None);
        };
        let now = self.clock.now();
        let Some(end) = self.detector.overtime_end(&open, now) else {
            return Ok(None);
        };

        tracing::warn!(
            worker_id,
            start = %open.start,
            end = %end,
            elapsed_minutes = open.elapsed(now).num_minutes(),
            "Closing overtime session"
        );
        self.check_out(worker_id, operator_id, end).await.map(Some)
    }

    /// Fetches the authoritative record and reconciles.
    pub async fn refresh(&self, worker_id: u64) -> Result<AttendanceState, AttendanceError> {
        let record = self.lookup.last_attendance_record(worker_id).await?;
        self.reconcile(worker_id, record.as_ref()).await
    }

    /// Seeds `CheckedIn` for workers in the persisted cache that have no state
    /// yet. Entries older than the shift ceiling are dropped from the cache
    /// instead. Returns how many were seeded.
    pub async fn restore(&self) -> Result<usize, ServiceError> {
        let now = self.clock.now();
        let mut cache = self.cache.section().await?;
        cache.reload().await?;
        let expired = cache
            .retain(|_, start| !self.detector.is_expired(start, now))
            .await?;
        if !expired.is_empty() {
            tracing::info!(workers = ?expired, "Discarded expired cached check-ins");
        }

        let mut inner = self.inner();
        let mut seeded = 0;
        for (&worker_id, &start) in cache.entries() {
            if inner.states.contains_key(&worker_id) {
                continue;
            }
            inner.states.insert(
                worker_id,
                AttendanceState::checked_in(AttendanceRecord::open(worker_id, start), None),
            );
            seeded += 1;
        }
        if seeded > 0 {
            tracing::info!(seeded, "Restored cached check-ins");
        }
        Ok(seeded)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Replaces local state with what the server reports. Idempotent.
    pub async fn reconcile(
        &self,
        worker_id: u64,
        server: Option<&ServerRecordDto>,
    ) -> Result<AttendanceState, AttendanceError> {
        let now = self.clock.now();
        let previous = self.state(worker_id);

        let next = match server {
            Some(dto) => {
                let record = self.adopt(worker_id, dto, now)?;
                if record.is_open() {
                    let last_closed = previous.last_closed_record.clone();
                    AttendanceState::checked_in(record, last_closed)
                } else {
                    AttendanceState::checked_out(record)
                }
            }
            None => AttendanceState::not_checked_in(worker_id),
        };

        if previous.status != next.status
            || previous.current_open_record.as_ref().map(|r| r.start)
                != next.current_open_record.as_ref().map(|r| r.start)
        {
            tracing::warn!(
                worker_id,
                local = %previous.status,
                server = %next.status,
                "Local attendance state disagreed with server"
            );
        }

        let epoch = {
            let mut inner = self.inner();
            let epoch = inner.epochs.entry(worker_id).or_insert(0);
            *epoch += 1;
            let epoch = *epoch;
            inner.states.insert(worker_id, next.clone());
            epoch
        };

        if let Err(e) = self.sync_cache(&next, epoch).await {
            tracing::warn!(worker_id, error = %e, "Failed to update check-in cache after reconcile");
        }

        Ok(next)
    }

    fn adopt(
        &self,
        worker_id: u64,
        dto: &ServerRecordDto,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AttendanceError> {
        if dto.user_id != worker_id {
            tracing::warn!(
                worker_id,
                record_user = dto.user_id,
                "Server record belongs to another worker"
            );
        }

        let mut source_raw = Vec::new();
        let start = match &dto.start_time {
            Some(raw) => {
                source_raw.push(raw.to_string());
                self.resolver.resolve(raw, now)?
            }
            None => {
                return Err(TimestampError::UnparsableTimestamp { raw: String::new() }.into());
            }
        };
        let end = match dto.end_time() {
            Some(raw) => {
                source_raw.push(raw.to_string());
                Some(self.resolver.resolve(raw, now)?)
            }
            None => None,
        };

        if !self.detector.is_plausible(start, now) {
            tracing::warn!(worker_id, start = %start, "Server check-in time looks implausible");
        }

        let mut record = AttendanceRecord::open(worker_id, start);
        record.record_id = dto.id;
        record.source_raw = source_raw;

        match end {
            Some(end) => match close_record(&record, end) {
                Ok(closed) => Ok(closed),
                Err(_) => {
                    tracing::warn!(
                        worker_id,
                        start = %start,
                        end = %end,
                        "Server record ends before it starts"
                    );
                    record.end = Some(end);
                    record.duration_minutes = Some(0);
                    Ok(record)
                }
            },
            None => Ok(record),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────────

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_for_check_in(&self, worker_id: u64) -> Result<InFlightGuard<'_>, AttendanceError> {
        self.locks
            .try_acquire(worker_id)
            .ok_or(AttendanceError::AlreadyCheckedIn { worker_id })
    }

    fn lock_for(&self, worker_id: u64) -> Result<InFlightGuard<'_>, AttendanceError> {
        self.locks
            .try_acquire(worker_id)
            .ok_or(AttendanceError::OperationInFlight { worker_id })
    }

    /// Writes `state` unless a reconcile happened since `epoch` was read.
    fn commit_if_current(&self, state: AttendanceState, epoch: u64) -> Option<AttendanceState> {
        let mut inner = self.inner();
        if inner.epoch(state.worker_id) != epoch {
            tracing::info!(
                worker_id = state.worker_id,
                "Optimistic update superseded by reconcile"
            );
            return None;
        }
        inner.states.insert(state.worker_id, state.clone());
        Some(state)
    }

    fn opened(&self, worker_id: u64, start: DateTime<Utc>) -> AttendanceState {
        let last_closed = self.state(worker_id).last_closed_record;
        AttendanceState::checked_in(AttendanceRecord::open(worker_id, start), last_closed)
    }

    /// Mirrors `state` into the cache unless a reconcile has moved the worker
    /// past `epoch`. Returns `false` when superseded.
    async fn sync_cache(&self, state: &AttendanceState, epoch: u64) -> Result<bool, ServiceError> {
        let worker_id = state.worker_id;
        let mut cache = self.cache.section().await?;
        if self.inner().epoch(worker_id) != epoch {
            return Ok(false);
        }
        match &state.current_open_record {
            Some(open) => cache.put(worker_id, open.start).await?,
            None => cache.remove(worker_id).await?,
        }
        Ok(true)
    }

    /// Cache first, then state. Nothing is committed if the cache write fails.
    async fn commit_optimistic(
        &self,
        next: AttendanceState,
        epoch: u64,
    ) -> Result<AttendanceState, ServiceError> {
        let worker_id = next.worker_id;
        let status = next.status;
        if !self.sync_cache(&next, epoch).await? {
            tracing::info!(worker_id, "Optimistic update superseded by reconcile");
            return Ok(self.state(worker_id));
        }
        match self.commit_if_current(next, epoch) {
            Some(state) => {
                tracing::info!(worker_id, status = %status, "Applied local transition");
                Ok(state)
            }
            None => Ok(self.state(worker_id)),
        }
    }

    /// The server already accepted the submission, so state follows it even
    /// when the cache cannot.
    async fn commit_accepted(&self, next: AttendanceState, epoch: u64) {
        let worker_id = next.worker_id;
        if let Err(e) = self.commit_optimistic(next.clone(), epoch).await {
            tracing::warn!(worker_id, error = %e, "Submission accepted but not cached locally");
            self.commit_if_current(next, epoch);
        }
    }

    /// Post-submission fetch. Failures keep the optimistic state.
    async fn confirm(&self, worker_id: u64) -> AttendanceState {
        match self.lookup.last_attendance_record(worker_id).await {
            Ok(record) => match self.reconcile(worker_id, record.as_ref()).await {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(worker_id, error = %e, "Could not reconcile confirmation record");
                    self.state(worker_id)
                }
            },
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "Confirmation lookup failed, keeping local state");
                self.state(worker_id)
            }
        }
    }
}

impl<L, S, K> AttendanceMachine<L, S, K> {
    /// Statuses of every worker seen this session.
    pub fn known_workers(&self) -> Vec<(u64, AttendanceStatus)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut workers: Vec<_> = inner
            .states
            .iter()
            .map(|(id, state)| (*id, state.status))
            .collect();
        workers.sort_unstable_by_key(|(id, _)| *id);
        workers
    }
}
