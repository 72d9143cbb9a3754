use std::{fmt::Display, str::FromStr};

use poise::serenity_prelude::{GuildId, UserId};
use thiserror::Error;

use super::types::UtcDateTime;

/// Identifies a submission inside one prompt type of one guild.
///
/// Rendered as `<guild>-<author>-<created at, unix ms>`. The textual form is
/// what buttons and footer icons carry, so it must stay within the identifier
/// codec alphabet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartialId {
    pub guild: GuildId,
    pub author: UserId,
    pub created_at: UtcDateTime,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartialIdError {
    #[error("Expected 3 components, got {0}")]
    WrongComponentCount(usize),
    #[error("Invalid component `{0}`")]
    InvalidComponent(String),
}

impl PartialId {
    pub fn new(guild: GuildId, author: UserId, created_at: UtcDateTime) -> PartialId {
        PartialId {
            guild,
            author,
            created_at,
        }
    }
}

impl Display for PartialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.guild.get(),
            self.author.get(),
            self.created_at.unix_millis()
        )
    }
}

impl FromStr for PartialId {
    type Err = PartialIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s.split('-').collect::<Vec<_>>();

        let [guild, author, created_at] = components.as_slice() else {
            return Err(PartialIdError::WrongComponentCount(components.len()));
        };

        let snowflake = |component: &str| match component.parse::<u64>() {
            Ok(value) if value != 0 => Ok(value),
            _ => Err(PartialIdError::InvalidComponent(component.to_string())),
        };

        let created_at = created_at
            .parse::<i64>()
            .ok()
            .filter(|millis| *millis >= 0)
            .and_then(UtcDateTime::from_unix_millis)
            .ok_or_else(|| PartialIdError::InvalidComponent(created_at.to_string()))?;

        Ok(PartialId {
            guild: GuildId::new(snowflake(guild)?),
            author: UserId::new(snowflake(author)?),
            created_at,
        })
    }
}
