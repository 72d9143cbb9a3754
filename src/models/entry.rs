use poise::serenity_prelude::{GuildId, UserId};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use super::{types::UtcDateTime, PartialId};

/// Prompt types that resolve with a single moderator action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum EntryType {
    Report,
    Suggestion,
    Resource,
    Ticket,
}

impl EntryType {
    pub fn title(&self) -> &'static str {
        match self {
            EntryType::Report => "Report",
            EntryType::Suggestion => "Suggestion",
            EntryType::Resource => "Resource submission",
            EntryType::Ticket => "Ticket",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Open,
    Resolved,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub entry_type: EntryType,
    pub guild: GuildId,
    pub author: UserId,
    pub created_at: UtcDateTime,
    pub subject: String,
    pub body: String,
    pub link: Option<String>,
    pub state: EntryState,
}

impl Entry {
    pub fn partial_id(&self) -> PartialId {
        PartialId::new(self.guild, self.author, self.created_at)
    }
}

#[derive(Debug)]
pub struct NewEntry {
    pub entry_type: EntryType,
    pub guild: GuildId,
    pub author: UserId,
    pub created_at: UtcDateTime,
    pub subject: String,
    pub body: String,
    pub link: Option<String>,
}
