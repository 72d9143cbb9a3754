use std::sync::Arc;

use async_trait::async_trait;
use serenity::{
    all::{ButtonStyle, ChannelId, GuildId, Message, MessageId, RoleId, User, UserId},
    builder::{
        CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter, CreateMessage, GetMessages,
    },
    cache::Cache,
    http::Http,
};

use super::{
    ButtonKind, ChatTransport, EmbedSnapshot, MemberProfile, PromptContent, PromptMessage,
    TransportError, UserProfile,
};

/// Discord allows at most this many members per request.
const MEMBERS_PAGE_SIZE: u64 = 1000;

/// [`ChatTransport`] over the Discord REST API.
///
/// Member lists come from the gateway cache when it holds the whole guild.
pub struct SerenityTransport {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityTransport {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> SerenityTransport {
        SerenityTransport { http, cache }
    }

    fn cached_members(&self, guild: GuildId) -> Option<Vec<MemberProfile>> {
        let guild = self.cache.guild(guild)?;

        // Large guilds carry only part of their members until they are chunked.
        if (guild.members.len() as u64) < guild.member_count {
            return None;
        }

        Some(
            guild
                .members
                .values()
                .map(|member| MemberProfile {
                    id: member.user.id,
                    bot: member.user.bot,
                    roles: member.roles.clone(),
                })
                .collect(),
        )
    }
}

impl From<&Message> for PromptMessage {
    fn from(message: &Message) -> Self {
        PromptMessage {
            id: message.id,
            channel_id: message.channel_id,
            embeds: message
                .embeds
                .iter()
                .map(|embed| EmbedSnapshot {
                    footer_icon_url: embed
                        .footer
                        .as_ref()
                        .and_then(|footer| footer.icon_url.clone()),
                })
                .collect(),
        }
    }
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            id: user.id,
            name: user.global_name.clone().unwrap_or_else(|| user.name.clone()),
            avatar_url: user.face(),
        }
    }
}

fn create_message(content: &PromptContent) -> CreateMessage {
    let embed = content.fields.iter().fold(
        CreateEmbed::new()
            .title(&content.title)
            .description(&content.description)
            .colour(content.colour)
            .footer(CreateEmbedFooter::new(&content.footer_text).icon_url(&content.footer_icon_url)),
        |embed, field| embed.field(&field.name, &field.value, field.inline),
    );

    let buttons = content
        .buttons
        .iter()
        .map(|button| {
            CreateButton::new(&button.custom_id)
                .label(&button.label)
                .style(match button.kind {
                    ButtonKind::Primary => ButtonStyle::Primary,
                    ButtonKind::Secondary => ButtonStyle::Secondary,
                    ButtonKind::Success => ButtonStyle::Success,
                    ButtonKind::Danger => ButtonStyle::Danger,
                })
        })
        .collect::<Vec<_>>();

    let message = CreateMessage::new().embed(embed);

    if buttons.is_empty() {
        message
    } else {
        message.components(vec![CreateActionRow::Buttons(buttons)])
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(http_err) => {
            http_err.status_code().map(|status| status.as_u16()) == Some(404)
        }
        _ => false,
    }
}

#[async_trait]
impl ChatTransport for SerenityTransport {
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &PromptContent,
    ) -> Result<PromptMessage, TransportError> {
        let message = channel
            .send_message(&self.http, create_message(content))
            .await?;

        Ok(PromptMessage::from(&message))
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), TransportError> {
        match channel.delete_message(&self.http, message).await {
            Err(err) if is_not_found(&err) => Ok(()),
            result => Ok(result?),
        }
    }

    async fn list_messages(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<PromptMessage>, TransportError> {
        let mut request = GetMessages::new().limit(limit);
        if let Some(before) = before {
            request = request.before(before);
        }

        let messages = channel.messages(&self.http, request).await?;

        Ok(messages.iter().map(PromptMessage::from).collect())
    }

    async fn get_user(&self, user: UserId) -> Result<Option<UserProfile>, TransportError> {
        match self.http.get_user(user).await {
            Ok(user) => Ok(Some(UserProfile::from(&user))),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_members(&self, guild: GuildId) -> Result<Vec<MemberProfile>, TransportError> {
        if let Some(members) = self.cached_members(guild) {
            return Ok(members);
        }

        let mut members = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let page = guild
                .members(&self.http, Some(MEMBERS_PAGE_SIZE), after)
                .await?;

            let page_len = page.len();
            after = page.last().map(|member| member.user.id);

            members.extend(page.into_iter().map(|member| MemberProfile {
                id: member.user.id,
                bot: member.user.bot,
                roles: member.roles,
            }));

            if (page_len as u64) < MEMBERS_PAGE_SIZE {
                break;
            }
        }

        Ok(members)
    }

    async fn add_member_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<(), TransportError> {
        self.http
            .add_member_role(guild, user, role, Some(reason))
            .await?;
        Ok(())
    }

    async fn ban_member(
        &self,
        guild: GuildId,
        user: UserId,
        reason: &str,
    ) -> Result<(), TransportError> {
        guild.ban_with_reason(&self.http, user, 0, reason).await?;
        Ok(())
    }
}
