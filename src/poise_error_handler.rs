use poise::{Context, CreateReply, FrameworkError};
use tracing::{error, warn};

use crate::{commands::CommandError, BotState};

pub async fn handle_error(error: FrameworkError<'_, BotState, CommandError>) {
    use FrameworkError::*;

    match error {
        Setup { error, .. } => {
            error!("Error in bot setup: {error}");
        }

        EventHandler { error, event, .. } => {
            error!(
                "Error in the {} event handler: {error}",
                event.snake_case_name()
            );
        }

        Command { error, ctx, .. } => {
            let command = &ctx.command().qualified_name;

            match error {
                CommandError::User { message } => {
                    reply_with_error(ctx, &message).await;
                }

                CommandError::Internal { message } => {
                    error!("Internal error in /{command}: {message}");
                    reply_with_internal_error(ctx).await;
                }

                CommandError::Serenity(error) => {
                    error!("Serenity error in /{command}: {error}");
                    reply_with_internal_error(ctx).await;
                }
            }
        }

        ArgumentParse {
            error, input, ctx, ..
        } => {
            let response = match input {
                Some(input) => format!("**Sorry, cannot parse `{input}`:** {error}"),
                None => format!("**{error}**"),
            };

            reply_with_error(ctx, &response).await;
        }

        CommandStructureMismatch {
            description, ctx, ..
        } => {
            error!(
                "Failed to deserialize interaction arguments for /{}: {description}",
                ctx.command.qualified_name
            );
        }

        MissingBotPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            warn!(
                "Missing bot permissions for /{}: {missing_permissions}",
                ctx.command().qualified_name
            );
            reply_with_error(
                ctx,
                "Sorry, the bot lacks permissions necessary to execute this command.",
            )
            .await;
        }

        GuildOnly { ctx, .. } => {
            reply_with_error(ctx, "Sorry, but you can only run this command in a server.").await;
        }

        UnknownInteraction { interaction, .. } => {
            warn!(
                "Received an unknown interaction: /{}",
                interaction.data.name
            );
        }

        error => {
            if let Err(err) = poise::builtins::on_error(error).await {
                error!("Could not handle a framework error: {err}");
            }
        }
    }
}

async fn reply_with_error(ctx: Context<'_, BotState, CommandError>, error_message: &str) {
    if let Err(send_error) = poise::send_reply(
        ctx,
        CreateReply::default()
            .content(error_message)
            .ephemeral(true),
    )
    .await
    {
        error!(
            "Failed to send an error message to the user: {send_error}\nThe message was: {error_message}"
        );
    }
}

async fn reply_with_internal_error(ctx: Context<'_, BotState, CommandError>) {
    reply_with_error(
        ctx,
        "Sorry, there was an internal error while executing your command. Please try again later.",
    )
    .await;
}
