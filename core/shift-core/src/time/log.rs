use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::Interpretation;

const DEFAULT_CAPACITY: usize = 256;

/// One zone-less resolution, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedInterpretation {
    pub raw: String,
    pub interpretation: Interpretation,
    pub instant: DateTime<Utc>,
    pub resolved_at: DateTime<Utc>,
}

/// Bounded, shared record of how zone-less timestamps were interpreted in this
/// session. Oldest entries fall off once the capacity is reached.
#[derive(Debug)]
pub struct InterpretationLog {
    entries: Mutex<VecDeque<LoggedInterpretation>>,
    capacity: usize,
}

impl Default for InterpretationLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl InterpretationLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, entry: LoggedInterpretation) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<LoggedInterpretation> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Counts of `(AssumedUtc, AssumedFixedOffset)` choices.
    pub fn assumption_counts(&self) -> (usize, usize) {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().fold((0, 0), |(utc, fixed), entry| {
            match entry.interpretation {
                Interpretation::AssumedUtc => (utc + 1, fixed),
                Interpretation::AssumedFixedOffset => (utc, fixed + 1),
                _ => (utc, fixed),
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(interpretation: Interpretation) -> LoggedInterpretation {
        LoggedInterpretation {
            raw: "2025-03-10 23:50:00".to_string(),
            interpretation,
            instant: Utc::now(),
            resolved_at: Utc::now(),
        }
    }

    #[test]
    fn test_counts_assumptions() {
        let log = InterpretationLog::default();
        log.record(entry(Interpretation::AssumedUtc));
        log.record(entry(Interpretation::AssumedFixedOffset));
        log.record(entry(Interpretation::AssumedFixedOffset));
        assert_eq!(log.assumption_counts(), (1, 2));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = InterpretationLog::with_capacity(2);
        log.record(entry(Interpretation::AssumedUtc));
        log.record(entry(Interpretation::AssumedFixedOffset));
        log.record(entry(Interpretation::AssumedFixedOffset));

        assert_eq!(log.len(), 2);
        assert_eq!(log.assumption_counts(), (0, 2));
    }

    #[test]
    fn test_clear() {
        let log = InterpretationLog::default();
        log.record(entry(Interpretation::AssumedUtc));
        log.clear();
        assert!(log.is_empty());
    }
}
