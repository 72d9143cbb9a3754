use std::fmt::Display;

use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// A UTC timestamp with millisecond precision.
///
/// Millisecond precision is what gets persisted and what partial ids carry,
/// so values are truncated on construction to keep both representations equal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtcDateTime(PrimitiveDateTime);

impl UtcDateTime {
    pub fn now() -> UtcDateTime {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        UtcDateTime::from_unix_millis((nanos / 1_000_000) as i64)
            .expect("Current time should be representable")
    }

    pub fn from_unix_millis(millis: i64) -> Option<UtcDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
            .ok()
            .map(UtcDateTime::from)
    }

    pub fn unix_millis(&self) -> i64 {
        (self.0.assume_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }
}

impl From<OffsetDateTime> for UtcDateTime {
    fn from(value: OffsetDateTime) -> Self {
        let value_utc = value.to_offset(UtcOffset::UTC);
        let time = value_utc.time();
        let millis = time
            .replace_nanosecond(time.millisecond() as u32 * 1_000_000)
            .expect("Whole milliseconds are a valid nanosecond value");
        UtcDateTime(PrimitiveDateTime::new(value_utc.date(), millis))
    }
}

impl From<UtcDateTime> for OffsetDateTime {
    fn from(value: UtcDateTime) -> Self {
        value.0.assume_utc()
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unix_millis())
    }
}
