use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, MessageId, RoleId, UserId};
use thiserror::Error;

use super::PromptContent;

/// The parts of a channel message the registry looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub embeds: Vec<EmbedSnapshot>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbedSnapshot {
    pub footer_icon_url: Option<String>,
}

/// A message edit as delivered by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageUpdate {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// `None` when the edit did not touch the embeds.
    pub embed_count: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberProfile {
    pub id: UserId,
    pub bot: bool,
    pub roles: Vec<RoleId>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Serenity(#[from] serenity::Error),
    #[cfg(test)]
    #[error("Injected transport failure")]
    Injected,
}

/// Everything the prompt machinery needs from the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &PromptContent,
    ) -> Result<PromptMessage, TransportError>;

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), TransportError>;

    /// One page of history, newest first, strictly older than `before`.
    async fn list_messages(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<PromptMessage>, TransportError>;

    /// `None` if the platform does not know the user.
    async fn get_user(&self, user: UserId) -> Result<Option<UserProfile>, TransportError>;

    async fn list_members(&self, guild: GuildId) -> Result<Vec<MemberProfile>, TransportError>;

    async fn add_member_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<(), TransportError>;

    async fn ban_member(
        &self,
        guild: GuildId,
        user: UserId,
        reason: &str,
    ) -> Result<(), TransportError>;
}
