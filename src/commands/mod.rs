mod arguments;
mod entries;
mod verify;

use poise::serenity_prelude as serenity;

use crate::{prompts::UserProfile, BotState};

pub use entries::{report, resource, suggest, ticket};
pub use verify::verify;

type CommandResult = Result<(), CommandError>;
type Context<'a> = poise::Context<'a, BotState, CommandError>;

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("{message}")]
    User { message: String },
    #[error("{message}")]
    Internal { message: String },
    #[error(transparent)]
    Serenity(#[from] serenity::Error),
}

fn user_err(message: impl Into<String>) -> CommandError {
    CommandError::User {
        message: message.into(),
    }
}

fn internal_err(message: impl Into<String>) -> CommandError {
    CommandError::Internal {
        message: message.into(),
    }
}

fn author_profile(ctx: Context<'_>) -> UserProfile {
    UserProfile::from(ctx.author())
}
