use indoc::formatdoc;
use poise::CreateReply;
use tracing::{error, info};

use crate::{
    commands::{
        arguments::{EntryLink, TrimmedText},
        author_profile, internal_err, user_err, CommandResult, Context,
    },
    models::{types::UtcDateTime, EntryType, NewEntry},
};

type Subject = TrimmedText<200>;
type Body = TrimmedText<2000>;

/// Report a problem to the moderators.
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn report(
    ctx: Context<'_>,
    #[description = "What is the report about?"] subject: Subject,
    #[description = "What happened?"] body: Body,
) -> CommandResult {
    submit_entry(ctx, EntryType::Report, subject, Some(body), None).await
}

/// Suggest an improvement for this server.
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn suggest(
    ctx: Context<'_>,
    #[description = "A short summary of your suggestion."] subject: Subject,
    #[description = "Your suggestion in detail."] body: Body,
) -> CommandResult {
    submit_entry(ctx, EntryType::Suggestion, subject, Some(body), None).await
}

/// Submit a resource for this server's collection.
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn resource(
    ctx: Context<'_>,
    #[description = "The name of the resource."] subject: Subject,
    #[description = "Where to find it, an http or https link."] link: EntryLink,
    #[description = "What is it useful for?"] body: Option<Body>,
) -> CommandResult {
    submit_entry(ctx, EntryType::Resource, subject, body, Some(link)).await
}

/// Open a ticket with the moderators.
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn ticket(
    ctx: Context<'_>,
    #[description = "What do you need help with?"] subject: Subject,
    #[description = "Describe your request."] body: Body,
) -> CommandResult {
    submit_entry(ctx, EntryType::Ticket, subject, Some(body), None).await
}

#[tracing::instrument(skip(ctx, subject, body, link), fields(author = %ctx.author().id))]
async fn submit_entry(
    ctx: Context<'_>,
    entry_type: EntryType,
    subject: Subject,
    body: Option<Body>,
    link: Option<EntryLink>,
) -> CommandResult {
    let guild = ctx
        .guild_id()
        .ok_or(internal_err("Entry commands should only be invoked in guilds"))?;
    let title = entry_type.title();

    if ctx
        .data()
        .prompts
        .settings(guild)
        .and_then(|settings| settings.entry(entry_type))
        .is_none()
    {
        return Err(user_err(format!(
            "{title}s are not enabled in this server."
        )));
    }

    let prompts = ctx
        .data()
        .prompts
        .guild(guild)
        .await
        .ok_or(user_err(
            "Prompts are still loading in this server, please try again shortly.",
        ))?;

    let registry = prompts
        .entries(entry_type)
        .ok_or(internal_err(format!("{title} prompts are not running")))?;

    let entry = ctx
        .data()
        .entry_repository
        .create(&NewEntry {
            entry_type,
            guild,
            author: ctx.author().id,
            created_at: UtcDateTime::now(),
            subject: subject.into(),
            body: body.map(String::from).unwrap_or_default(),
            link: link.map(String::from),
        })
        .await
        .map_err(|err| internal_err(format!("Could not store your {entry_type}: {err}")))?;

    info!("Stored {entry_type} {}", entry.partial_id());

    // The entry is stored either way: a failed send is retried on the next start.
    if let Err(err) = registry.track(&author_profile(ctx), entry).await {
        error!("Could not post the {entry_type} prompt: {err:#}");
    }

    let message = formatdoc! {
        r#"
            **{title} submitted!**

            The moderators will look at it soon.
        "#,
    };

    ctx.send(CreateReply::default().ephemeral(true).content(message))
        .await?;

    Ok(())
}
