use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shift_protocol::RawTime;

use super::log::{InterpretationLog, LoggedInterpretation};
use crate::config::ShiftConfig;
use crate::error::TimestampError;
use crate::patterns::{RE_UNIX_MILLIS, RE_UNIX_SECONDS, RE_ZONED_ISO, RE_ZONELESS};

/// A timestamp before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Integer(i64),
    Text(String),
}

impl RawTimestamp {
    pub fn as_text(&self) -> String {
        match self {
            RawTimestamp::Integer(value) => value.to_string(),
            RawTimestamp::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

impl From<String> for RawTimestamp {
    fn from(value: String) -> Self {
        RawTimestamp::Text(value)
    }
}

impl From<i64> for RawTimestamp {
    fn from(value: i64) -> Self {
        RawTimestamp::Integer(value)
    }
}

impl From<&RawTime> for RawTimestamp {
    fn from(value: &RawTime) -> Self {
        match value {
            RawTime::Integer(v) => RawTimestamp::Integer(*v),
            RawTime::Text(t) => RawTimestamp::Text(t.clone()),
        }
    }
}

/// How a raw value became an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpretation {
    UnixSeconds,
    UnixMillis,
    ExplicitOffset,
    /// Zone-less value read as UTC because that was closer to now.
    AssumedUtc,
    /// Zone-less value read in the configured fixed offset.
    AssumedFixedOffset,
}

impl Interpretation {
    pub fn is_assumed(self) -> bool {
        matches!(
            self,
            Interpretation::AssumedUtc | Interpretation::AssumedFixedOffset
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub instant: DateTime<Utc>,
    pub interpretation: Interpretation,
    /// The other candidate for zone-less values.
    pub rejected: Option<DateTime<Utc>>,
}

/// Resolves backend timestamps to UTC instants.
///
/// Forms, tried in order:
/// 1. 10-digit Unix seconds (number or all-digit string)
/// 2. 13-digit Unix millis
/// 3. ISO-8601 with `Z` or `±HH:MM`
/// 4. `YYYY-MM-DD HH:mm:ss[.SSS]` without a zone
///
/// For form 4 both UTC and the fixed offset are computed and the one closer to
/// `now` wins. Equal distances go to the fixed offset. Near the point where
/// both candidates are equidistant this can pick the wrong one; callers that
/// know the zone should send a zoned value.
#[derive(Debug, Clone)]
pub struct TimestampResolver {
    offset: FixedOffset,
    log: Option<Arc<InterpretationLog>>,
}

impl TimestampResolver {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset, log: None }
    }

    pub fn from_config(config: &ShiftConfig) -> crate::Result<Self> {
        Ok(Self::new(config.fixed_offset()?))
    }

    /// Shares zone-less choices with diagnostics.
    pub fn with_log(mut self, log: Arc<InterpretationLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn log(&self) -> Option<&Arc<InterpretationLog>> {
        self.log.as_ref()
    }

    pub fn resolve(
        &self,
        raw: impl Into<RawTimestamp>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, TimestampError> {
        self.resolve_detailed(raw, now).map(|r| r.instant)
    }

    pub fn resolve_detailed(
        &self,
        raw: impl Into<RawTimestamp>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, TimestampError> {
        let raw = raw.into();
        let text = raw.as_text();
        let trimmed = text.trim();
        let unparsable = || TimestampError::UnparsableTimestamp {
            raw: text.clone(),
        };

        if RE_UNIX_SECONDS.is_match(trimmed) {
            let secs: i64 = trimmed.parse().map_err(|_| unparsable())?;
            let instant = Utc.timestamp_opt(secs, 0).single().ok_or_else(unparsable)?;
            return Ok(exact(instant, Interpretation::UnixSeconds));
        }

        if RE_UNIX_MILLIS.is_match(trimmed) {
            let millis: i64 = trimmed.parse().map_err(|_| unparsable())?;
            let instant = Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(unparsable)?;
            return Ok(exact(instant, Interpretation::UnixMillis));
        }

        if RE_ZONED_ISO.is_match(trimmed) {
            let normalized = normalize_zoned(trimmed);
            let instant = DateTime::parse_from_rfc3339(&normalized)
                .map_err(|_| unparsable())?
                .with_timezone(&Utc);
            return Ok(exact(instant, Interpretation::ExplicitOffset));
        }

        let naive = parse_zoneless(trimmed).ok_or_else(unparsable)?;
        let resolution = self.pick_nearest(naive, now).ok_or_else(unparsable)?;

        tracing::debug!(
            raw = %trimmed,
            chosen = ?resolution.interpretation,
            instant = %resolution.instant,
            rejected = ?resolution.rejected,
            "Resolved zone-less timestamp"
        );

        if let Some(log) = &self.log {
            log.record(LoggedInterpretation {
                raw: trimmed.to_string(),
                interpretation: resolution.interpretation,
                instant: resolution.instant,
                resolved_at: now,
            });
        }

        Ok(resolution)
    }

    fn pick_nearest(&self, naive: NaiveDateTime, now: DateTime<Utc>) -> Option<Resolution> {
        let as_utc = Utc.from_utc_datetime(&naive);
        let as_fixed = self
            .offset
            .from_local_datetime(&naive)
            .single()?
            .with_timezone(&Utc);

        let utc_distance = (now - as_utc).num_milliseconds().abs();
        let fixed_distance = (now - as_fixed).num_milliseconds().abs();

        if utc_distance < fixed_distance {
            Some(Resolution {
                instant: as_utc,
                interpretation: Interpretation::AssumedUtc,
                rejected: Some(as_fixed),
            })
        } else {
            Some(Resolution {
                instant: as_fixed,
                interpretation: Interpretation::AssumedFixedOffset,
                rejected: Some(as_utc),
            })
        }
    }
}

fn exact(instant: DateTime<Utc>, interpretation: Interpretation) -> Resolution {
    Resolution {
        instant,
        interpretation,
        rejected: None,
    }
}

fn normalize_zoned(value: &str) -> String {
    let mut normalized = value.replacen(['t', ' '], "T", 1);
    if normalized.ends_with('z') {
        normalized.pop();
        normalized.push('Z');
    }
    normalized
}

fn parse_zoneless(value: &str) -> Option<NaiveDateTime> {
    let caps = RE_ZONELESS.captures(value)?;
    let base = NaiveDateTime::parse_from_str(
        &format!("{} {}", &caps[1], &caps[2]),
        "%Y-%m-%d %H:%M:%S",
    )
    .ok()?;

    match caps.get(3) {
        Some(fraction) => {
            let digits = fraction.as_str();
            let scale = 10i64.pow(9 - digits.len() as u32);
            let nanos: i64 = digits.parse().ok()?;
            Some(base + Duration::nanoseconds(nanos * scale))
        }
        None => Some(base),
    }
}
