//! Per-guild prompt configuration, read once at startup from a JSON file.
//!
//! ```json
//! {
//!   "123456789012345678": {
//!     "verification": {
//!       "channel": 234567890123456789,
//!       "management": { "roles": [345678901234567890] },
//!       "voters": { "roles": [345678901234567890], "users": [] },
//!       "acceptance": { "type": "fraction", "value": 0.5 },
//!       "rejection": { "type": "number", "value": 3 },
//!       "defaultRole": 456789012345678901,
//!       "requestableRoles": [456789012345678902]
//!     },
//!     "ticket": { "channel": 567890123456789012, "deleteMode": "close" }
//!   }
//! }
//! ```
//!
//! A prompt type without a section is disabled in that guild.

use std::{collections::HashMap, io, path::Path};

use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::{models::EntryType, tally::QuorumPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read the prompt config: {0}")]
    Io(#[from] io::Error),
    #[error("Could not parse the prompt config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid {side} quorum for guild {guild}: fractions must be in (0, 1]")]
    InvalidQuorum { guild: GuildId, side: &'static str },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PromptSettings {
    guilds: HashMap<GuildId, GuildPromptConfig>,
}

impl PromptSettings {
    /// A missing file means no guild has prompts enabled.
    pub fn load(path: impl AsRef<Path>) -> Result<PromptSettings, ConfigError> {
        let path = path.as_ref();

        match std::fs::read_to_string(path) {
            Ok(json) => PromptSettings::from_json(&json),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "Prompt config {} does not exist, all prompts are disabled",
                    path.display()
                );
                Ok(PromptSettings::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_json(json: &str) -> Result<PromptSettings, ConfigError> {
        let guilds: HashMap<GuildId, GuildPromptConfig> =
            serde_json::from_str::<HashMap<u64, GuildPromptConfig>>(json)?
                .into_iter()
                .filter(|(guild, _)| *guild != 0)
                .map(|(guild, config)| (GuildId::new(guild), config))
                .collect();

        for (&guild, config) in &guilds {
            if let Some(verification) = &config.verification {
                if !verification.acceptance.is_valid() {
                    return Err(ConfigError::InvalidQuorum {
                        guild,
                        side: "acceptance",
                    });
                }
                if !verification.rejection.is_valid() {
                    return Err(ConfigError::InvalidQuorum {
                        guild,
                        side: "rejection",
                    });
                }
            }
        }

        Ok(PromptSettings { guilds })
    }

    pub fn guild(&self, guild: GuildId) -> Option<&GuildPromptConfig> {
        self.guilds.get(&guild)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct GuildPromptConfig {
    pub verification: Option<VerificationConfig>,
    pub report: Option<EntryConfig>,
    pub suggestion: Option<EntryConfig>,
    pub resource: Option<EntryConfig>,
    pub ticket: Option<EntryConfig>,
}

impl GuildPromptConfig {
    pub fn entry(&self, entry_type: EntryType) -> Option<&EntryConfig> {
        match entry_type {
            EntryType::Report => self.report.as_ref(),
            EntryType::Suggestion => self.suggestion.as_ref(),
            EntryType::Resource => self.resource.as_ref(),
            EntryType::Ticket => self.ticket.as_ref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationConfig {
    pub channel: ChannelId,
    #[serde(default)]
    pub management: AllowList,
    #[serde(default)]
    pub delete_mode: DeleteMode,
    #[serde(default)]
    pub voters: AllowList,
    pub acceptance: QuorumPolicy,
    pub rejection: QuorumPolicy,
    /// Granted on acceptance when the request names no role.
    pub default_role: Option<RoleId>,
    /// Roles members may ask for in their request.
    #[serde(default)]
    pub requestable_roles: Vec<RoleId>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryConfig {
    pub channel: ChannelId,
    #[serde(default)]
    pub management: AllowList,
    #[serde(default)]
    pub delete_mode: DeleteMode,
}

/// What the remove button does to the stored record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    #[default]
    Delete,
    Close,
}

/// Members admitted either by one of their roles or individually.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AllowList {
    #[serde(default)]
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub users: Vec<UserId>,
}

impl AllowList {
    pub fn allows(&self, user: UserId, roles: &[RoleId]) -> bool {
        self.users.contains(&user) || roles.iter().any(|role| self.roles.contains(role))
    }
}
