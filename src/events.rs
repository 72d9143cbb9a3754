use poise::serenity_prelude::{
    self as serenity, ComponentInteraction, CreateInteractionResponse,
    CreateInteractionResponseFollowup, FullEvent, Interaction,
};
use tracing::{info_span, warn, Instrument};

use crate::{
    commands::CommandError,
    prompts::{codec, InteractionReply, MessageUpdate, PromptActor},
    BotState,
};

pub async fn handle_event(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, BotState, CommandError>,
    data: &BotState,
) -> Result<(), CommandError> {
    match event {
        FullEvent::GuildCreate { guild, .. } => {
            let prompts = data.prompts.clone();
            let guild = guild.id;

            // Reconciliation reads whole channel histories, keep it off the event task.
            tokio::spawn(
                async move { prompts.activate_guild(guild).await }
                    .instrument(info_span!("guild_activation", %guild)),
            );
        }

        FullEvent::GuildDelete { incomplete, .. } => {
            data.prompts.deactivate_guild(incomplete.id).await;
        }

        FullEvent::MessageUpdate { event, .. } => {
            if let Some(guild) = event.guild_id {
                let update = MessageUpdate {
                    id: event.id,
                    channel_id: event.channel_id,
                    embed_count: event.embeds.as_ref().map(Vec::len),
                };
                data.prompts.on_message_update(guild, &update).await;
            }
        }

        FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            guild_id: Some(guild),
        } => {
            data.prompts
                .on_message_delete(*guild, *channel_id, *deleted_message_id)
                .await;
        }

        FullEvent::MessageDeleteBulk {
            channel_id,
            multiple_deleted_messages_ids,
            guild_id: Some(guild),
        } => {
            for message in multiple_deleted_messages_ids {
                data.prompts
                    .on_message_delete(*guild, *channel_id, *message)
                    .await;
            }
        }

        FullEvent::InteractionCreate {
            interaction: Interaction::Component(component),
        } => {
            handle_component(ctx, component, data).await;
        }

        _ => {}
    }

    Ok(())
}

/// Acknowledges the press right away and sends the reply text as an
/// ephemeral follow-up: votes may take longer than an interaction response
/// is accepted for.
async fn handle_component(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    data: &BotState,
) {
    let Some(guild) = component.guild_id else {
        return;
    };

    let custom_id = &component.data.custom_id;
    if codec::decode(custom_id).is_err() {
        return;
    }

    if let Err(err) = component
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await
    {
        warn!("Could not acknowledge the interaction on {custom_id}: {err}");
    }

    let actor = PromptActor {
        user: component.user.id,
        roles: component
            .member
            .as_ref()
            .map(|member| member.roles.clone())
            .unwrap_or_default(),
    };

    let Some(followup) = data
        .prompts
        .handle_component(guild, custom_id, actor)
        .await
        .and_then(followup)
    else {
        return;
    };

    if let Err(err) = component.create_followup(&ctx.http, followup).await {
        warn!("Could not reply to the interaction on {custom_id}: {err}");
    }
}

/// The message sent after the acknowledgement, if the reply carries one.
fn followup(reply: InteractionReply) -> Option<CreateInteractionResponseFollowup> {
    match reply {
        InteractionReply::Acknowledge => None,
        InteractionReply::Ephemeral(message) => Some(
            CreateInteractionResponseFollowup::new()
                .content(message)
                .ephemeral(true),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::followup;
    use crate::prompts::InteractionReply;

    #[test]
    fn acknowledged_presses_need_no_followup() {
        assert!(followup(InteractionReply::Acknowledge).is_none());
    }

    #[test]
    fn reply_text_is_sent_as_ephemeral_followup() {
        let followup = followup(InteractionReply::ephemeral(
            "You already voted to accept this request.",
        ))
        .unwrap();
        let json = serde_json::to_value(&followup).unwrap();

        assert_eq!(json["content"], "You already voted to accept this request.");
        assert!(!json["flags"].is_null());
    }
}
