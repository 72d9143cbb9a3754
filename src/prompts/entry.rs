use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude::{GuildId, Mentionable};
use tracing::info;

use crate::{
    config::{AllowList, DeleteMode},
    models::{Entry, EntryState, EntryType, PartialId},
    repository::EntryRepository,
    utils::format_submitted,
};

use super::{
    codec, ButtonKind, Handled, InteractionReply, Outcome, PromptContent, PromptInteraction,
    PromptKind, UserProfile, REMOVE_ACTION,
};

pub const RESOLVE_ACTION: &str = "resolve";

/// Reports, suggestions, resources and tickets: one moderator press settles them.
pub struct EntryPrompts {
    entry_type: EntryType,
    management: AllowList,
    delete_mode: DeleteMode,
    repository: Arc<EntryRepository>,
}

impl EntryPrompts {
    pub fn new(
        entry_type: EntryType,
        management: AllowList,
        delete_mode: DeleteMode,
        repository: Arc<EntryRepository>,
    ) -> EntryPrompts {
        EntryPrompts {
            entry_type,
            management,
            delete_mode,
            repository,
        }
    }

    fn colour(&self) -> u32 {
        match self.entry_type {
            EntryType::Report => 0xe74c3c,
            EntryType::Suggestion => 0x3498db,
            EntryType::Resource => 0x2ecc71,
            EntryType::Ticket => 0x9b59b6,
        }
    }
}

#[async_trait]
impl PromptKind for EntryPrompts {
    type Record = Entry;

    fn name(&self) -> &'static str {
        self.entry_type.into()
    }

    fn partial_id(&self, record: &Entry) -> PartialId {
        record.partial_id()
    }

    fn settled_reply(&self, record: &Entry) -> Option<String> {
        let name = self.name();
        match record.state {
            EntryState::Open => None,
            EntryState::Resolved => Some(format!("This {name} is already resolved.")),
            EntryState::Closed => Some(format!("This {name} is already closed.")),
        }
    }

    async fn get_all_documents(&self, guild: GuildId) -> anyhow::Result<Vec<Entry>> {
        self.repository.get_all_open(guild, self.entry_type).await
    }

    async fn get_user_document(&self, partial_id: &PartialId) -> anyhow::Result<Option<Entry>> {
        self.repository.get(self.entry_type, partial_id).await
    }

    fn get_prompt_content(
        &self,
        record: &Entry,
        author: &UserProfile,
    ) -> Result<PromptContent, codec::CodecError> {
        let name = self.name();
        let partial_id = record.partial_id();

        let mut content = PromptContent::new(
            name,
            &partial_id,
            author,
            format!("{}: {}", self.entry_type.title(), record.subject),
        )?
        .description(record.body.clone())
        .colour(self.colour())
        .field("Author", author.id.mention().to_string(), true)
        .field("Submitted", format_submitted(record.created_at), true);

        if let Some(link) = &record.link {
            content = content.field("Link", link.clone(), false);
        }

        let remove_label = match self.delete_mode {
            DeleteMode::Delete => "Delete",
            DeleteMode::Close => "Close",
        };

        content
            .button(name, RESOLVE_ACTION, &partial_id, "Resolve", ButtonKind::Success)?
            .button(name, REMOVE_ACTION, &partial_id, remove_label, ButtonKind::Secondary)
    }

    async fn handle_prompt_interaction(
        &self,
        record: &Entry,
        interaction: &PromptInteraction,
    ) -> anyhow::Result<Handled<Entry>> {
        let name = self.name();

        if interaction.action != RESOLVE_ACTION {
            anyhow::bail!("Unsupported {name} action `{}`", interaction.action);
        }

        if let Some(reply) = self.settled_reply(record) {
            return Ok(Handled::unchanged(reply));
        }

        let actor = &interaction.actor;
        if !self.management.allows(actor.user, &actor.roles) {
            return Ok(Handled::unchanged(format!(
                "You are not allowed to resolve this {name}."
            )));
        }

        if !self
            .repository
            .settle(record.id, EntryState::Resolved)
            .await?
        {
            return Ok(Handled {
                outcome: Outcome::Terminal,
                reply: InteractionReply::ephemeral(format!("This {name} is no longer open.")),
            });
        }

        info!("{} resolved {name} {}", actor.user, record.partial_id());

        Ok(Handled {
            outcome: Outcome::Terminal,
            reply: InteractionReply::ephemeral(format!("Resolved the {name}.")),
        })
    }

    async fn remove_document(&self, record: &Entry, mode: DeleteMode) -> anyhow::Result<()> {
        match mode {
            DeleteMode::Delete => {
                self.repository.delete(record.id).await?;
            }
            DeleteMode::Close => {
                self.repository.settle(record.id, EntryState::Closed).await?;
            }
        }
        Ok(())
    }
}
