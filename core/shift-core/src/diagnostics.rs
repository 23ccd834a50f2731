//! Advisory conflict detection.
//!
//! `scan` reads timers, persisted keys, two clocks and the interpretation log.
//! It never changes any of them; fixing a conflict is the caller's decision.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::ShiftConfig;
use crate::error::ServiceError;
use crate::patterns::RE_CHECKIN_CACHE_KEY;
use crate::services::KeyValueStore;
use crate::time::InterpretationLog;

// ═══════════════════════════════════════════════════════════════════════════════
// Timer Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Tracks active recurring timers. Register one per timer and keep the guard
/// alive for as long as the timer runs.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    next_id: AtomicU64,
    active: Mutex<BTreeMap<u64, String>>,
}

impl TimerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(self: &Arc<Self>, label: impl Into<String>) -> TimerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        tracing::debug!(id, label = %label, "Timer registered");
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, label);
        TimerGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn labels(&self) -> Vec<String> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

/// Deregisters its timer on drop.
#[derive(Debug)]
pub struct TimerGuard {
    registry: Arc<TimerRegistry>,
    id: u64,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conflicts
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    DuplicateTimers { count: usize, labels: Vec<String> },
    DuplicateCacheKeys { keys: Vec<String> },
    ClockDisagreement { skew_ms: i64 },
    MixedInterpretations { assumed_utc: usize, assumed_fixed: usize },
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::DuplicateTimers { count, labels } => {
                write!(f, "{} recurring timers active: {}", count, labels.join(", "))
            }
            Conflict::DuplicateCacheKeys { keys } => {
                write!(f, "multiple attendance cache keys: {}", keys.join(", "))
            }
            Conflict::ClockDisagreement { skew_ms } => {
                write!(f, "clock paths disagree by {} ms", skew_ms)
            }
            Conflict::MixedInterpretations {
                assumed_utc,
                assumed_fixed,
            } => write!(
                f,
                "zone-less timestamps read as UTC {} times and as fixed offset {} times",
                assumed_utc, assumed_fixed
            ),
        }
    }
}

pub struct ConflictDiagnostics {
    timers: Arc<TimerRegistry>,
    log: Arc<InterpretationLog>,
    cache_key_pattern: Regex,
    clock_tolerance: Duration,
    primary_clock: Arc<dyn Clock>,
    secondary_clock: Arc<dyn Clock>,
}

impl ConflictDiagnostics {
    pub fn new(
        timers: Arc<TimerRegistry>,
        log: Arc<InterpretationLog>,
        primary_clock: Arc<dyn Clock>,
        secondary_clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            timers,
            log,
            cache_key_pattern: RE_CHECKIN_CACHE_KEY.clone(),
            clock_tolerance: ShiftConfig::default().clock_tolerance(),
            primary_clock,
            secondary_clock,
        }
    }

    /// Applies the cache-key pattern and clock tolerance from `config`.
    pub fn configure(mut self, config: &ShiftConfig) -> crate::Result<Self> {
        self.cache_key_pattern = config.cache_key_regex()?;
        self.clock_tolerance = config.clock_tolerance();
        Ok(self)
    }

    pub async fn scan<K: KeyValueStore>(&self, store: &K) -> Result<Vec<Conflict>, ServiceError> {
        let mut conflicts = Vec::new();

        let timers = self.timers.active_count();
        if timers > 1 {
            conflicts.push(Conflict::DuplicateTimers {
                count: timers,
                labels: self.timers.labels(),
            });
        }

        let keys: Vec<String> = store
            .keys()
            .await?
            .into_iter()
            .filter(|key| self.cache_key_pattern.is_match(key))
            .collect();
        if keys.len() > 1 {
            conflicts.push(Conflict::DuplicateCacheKeys { keys });
        }

        let skew = self.primary_clock.now() - self.secondary_clock.now();
        let skew_ms = skew.num_milliseconds();
        if skew_ms.unsigned_abs() > self.clock_tolerance.as_millis() as u64 {
            conflicts.push(Conflict::ClockDisagreement { skew_ms });
        }

        let (assumed_utc, assumed_fixed) = self.log.assumption_counts();
        if assumed_utc > 0 && assumed_fixed > 0 {
            conflicts.push(Conflict::MixedInterpretations {
                assumed_utc,
                assumed_fixed,
            });
        }

        for conflict in &conflicts {
            tracing::warn!(conflict = %conflict, "Diagnostics found a conflict");
        }
        Ok(conflicts)
    }
}
