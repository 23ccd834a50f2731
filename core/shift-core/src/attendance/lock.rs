//! Per-worker in-flight locks.
//!
//! A worker id sits in the set while an operation for it is running. The guard
//! removes it on drop, so early returns and errors release the lock too.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct InFlightLocks {
    held: Mutex<HashSet<u64>>,
}

impl InFlightLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when another operation already holds the worker.
    pub fn try_acquire(&self, worker_id: u64) -> Option<InFlightGuard<'_>> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.insert(worker_id) {
            Some(InFlightGuard {
                locks: self,
                worker_id,
            })
        } else {
            None
        }
    }

    pub fn is_held(&self, worker_id: u64) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&worker_id)
    }

    fn release(&self, worker_id: u64) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&worker_id);
    }
}

#[derive(Debug)]
pub struct InFlightGuard<'a> {
    locks: &'a InFlightLocks,
    worker_id: u64,
}

impl InFlightGuard<'_> {
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(self.worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let locks = InFlightLocks::new();
        let _guard = locks.try_acquire(1).unwrap();
        assert!(locks.try_acquire(1).is_none());
    }

    #[test]
    fn test_workers_do_not_block_each_other() {
        let locks = InFlightLocks::new();
        let _a = locks.try_acquire(1).unwrap();
        assert!(locks.try_acquire(2).is_some());
    }

    #[test]
    fn test_drop_releases() {
        let locks = InFlightLocks::new();
        {
            let guard = locks.try_acquire(1).unwrap();
            assert_eq!(guard.worker_id(), 1);
            assert!(locks.is_held(1));
        }
        assert!(!locks.is_held(1));
        assert!(locks.try_acquire(1).is_some());
    }

    #[test]
    fn test_release_on_error_path() {
        fn failing(locks: &InFlightLocks) -> Result<(), &'static str> {
            let _guard = locks.try_acquire(5).ok_or("busy")?;
            Err("submission failed")
        }

        let locks = InFlightLocks::new();
        assert!(failing(&locks).is_err());
        assert!(!locks.is_held(5));
    }
}
