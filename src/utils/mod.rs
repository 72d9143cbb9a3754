mod discord_timestamp;

pub use discord_timestamp::format_submitted;
