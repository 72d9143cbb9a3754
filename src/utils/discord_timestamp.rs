use std::fmt::Display;

use time::OffsetDateTime;

/// How a Discord client renders a `<t:…>` timestamp in the reader's locale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampStyle {
    /// Short date/time, e.g. `20 April 2021 16:20`
    ShortDateTime,
    /// Relative time, e.g. `2 months ago`
    RelativeTime,
}

impl Display for TimestampStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

impl TimestampStyle {
    pub fn suffix(&self) -> &'static str {
        match self {
            TimestampStyle::ShortDateTime => "f",
            TimestampStyle::RelativeTime => "R",
        }
    }
}

pub fn timestamp(datetime: OffsetDateTime, style: TimestampStyle) -> String {
    let unix_timestamp = datetime.unix_timestamp();
    format!("<t:{unix_timestamp}:{style}>")
}

/// Absolute and relative time of a submission, e.g. `<t:1700000000:f> (<t:1700000000:R>)`.
pub fn format_submitted(date_time: impl Into<OffsetDateTime>) -> String {
    let date_time = date_time.into();
    format!(
        "{} ({})",
        timestamp(date_time, TimestampStyle::ShortDateTime),
        timestamp(date_time, TimestampStyle::RelativeTime)
    )
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::{format_submitted, timestamp, TimestampStyle};

    #[test]
    fn renders_discord_markup() {
        let date_time = datetime!(2023-11-14 22:13:20 UTC);

        assert_eq!(
            timestamp(date_time, TimestampStyle::RelativeTime),
            "<t:1700000000:R>"
        );
        assert_eq!(
            format_submitted(date_time),
            "<t:1700000000:f> (<t:1700000000:R>)"
        );
    }
}
