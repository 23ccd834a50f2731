//! Timestamp resolution for backend values with ambiguous zones.
//!
//! The backend emits Unix numbers, zoned ISO strings, and zone-less
//! `YYYY-MM-DD HH:mm:ss` strings that may be UTC or the deployment offset.
//! [`TimestampResolver`] turns all of them into one `DateTime<Utc>`.

mod log;
mod resolver;

pub use log::{InterpretationLog, LoggedInterpretation};
pub use resolver::{Interpretation, RawTimestamp, Resolution, TimestampResolver};

use chrono::{DateTime, FixedOffset, Utc};
use shift_protocol::SUBMISSION_TIME_FORMAT;

/// Renders `instant` as `YYYY-MM-DD HH:mm:ss` in `offset`, the format the
/// backend accepts for submissions.
pub fn format_fixed(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant
        .with_timezone(&offset)
        .format(SUBMISSION_TIME_FORMAT)
        .to_string()
}
