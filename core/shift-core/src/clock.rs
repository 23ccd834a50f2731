//! Injectable time sources.
//!
//! Resolution and anomaly checks take "now" from a [`Clock`] so tests can pin
//! it. Two production clocks exist because diagnostics compare independent
//! paths to the current time.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// `Utc::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Reads local wall time and converts it to UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalWallClock;

impl Clock for LocalWallClock {
    fn now(&self) -> DateTime<Utc> {
        Local::now().with_timezone(&Utc)
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
