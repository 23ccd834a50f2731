//! Compiled regex patterns for timestamp shapes.
//!
//! Compiled once on first use. Update these when the backend starts emitting
//! a new timestamp layout.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Unix Epoch Shapes
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_UNIX_SECONDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").unwrap());
pub static RE_UNIX_MILLIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{13}$").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Calendar Shapes
// ═══════════════════════════════════════════════════════════════════════════════

/// ISO-8601 with an explicit `Z` or `±HH:MM` designator.
pub static RE_ZONED_ISO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[Tt ]\d{2}:\d{2}:\d{2}(\.\d{1,9})?([Zz]|[+-]\d{2}:\d{2})$")
        .unwrap()
});

/// `YYYY-MM-DD HH:mm:ss[.SSS]` (or `T` separated) with no zone designator.
/// Captures: date, time, optional fraction digits.
pub static RE_ZONELESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})[Tt ](\d{2}:\d{2}:\d{2})(?:\.(\d{1,9}))?$").unwrap()
});

// ═══════════════════════════════════════════════════════════════════════════════
// Persisted Keys
// ═══════════════════════════════════════════════════════════════════════════════

/// Default pattern for keys that hold attendance check-in caches.
pub static RE_CHECKIN_CACHE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)checkin").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_shapes_are_exact_length() {
        assert!(RE_UNIX_SECONDS.is_match("1741650600"));
        assert!(!RE_UNIX_SECONDS.is_match("174165060"));
        assert!(RE_UNIX_MILLIS.is_match("1741650600000"));
        assert!(!RE_UNIX_MILLIS.is_match("17416506000001"));
    }

    #[test]
    fn test_zoned_vs_zoneless() {
        assert!(RE_ZONED_ISO.is_match("2025-03-10T23:50:00Z"));
        assert!(RE_ZONED_ISO.is_match("2025-03-10T23:50:00.123+08:00"));
        assert!(!RE_ZONED_ISO.is_match("2025-03-10 23:50:00"));

        assert!(RE_ZONELESS.is_match("2025-03-10 23:50:00"));
        assert!(RE_ZONELESS.is_match("2025-03-10T23:50:00.250"));
        assert!(!RE_ZONELESS.is_match("2025-03-10 23:50"));
    }

    #[test]
    fn test_zoneless_captures_fraction() {
        let caps = RE_ZONELESS.captures("2025-03-10 23:50:00.250").unwrap();
        assert_eq!(&caps[1], "2025-03-10");
        assert_eq!(&caps[2], "23:50:00");
        assert_eq!(caps.get(3).map(|m| m.as_str()), Some("250"));
    }
}
