use indoc::formatdoc;
use poise::{serenity_prelude::Role, CreateReply};
use tracing::{error, info};

use crate::{
    commands::{
        arguments::TrimmedText, author_profile, internal_err, user_err, CommandResult, Context,
    },
    models::{types::UtcDateTime, MemberStatus, NewVerificationRequest},
};

/// Ask the members of this server to verify you.
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn verify(
    ctx: Context<'_>,

    #[description = "Tell the members who you are and why you want to join."]
    answers: TrimmedText<1000>,

    #[description = "The role you are asking for."] role: Option<Role>,
) -> CommandResult {
    let guild = ctx
        .guild_id()
        .ok_or(internal_err("Verify command should only be invoked in guilds"))?;
    let author = ctx.author().id;

    let config = ctx
        .data()
        .prompts
        .settings(guild)
        .and_then(|settings| settings.verification.as_ref())
        .ok_or(user_err("Verification is not enabled in this server."))?;

    let requested_role = match role {
        Some(role) if config.requestable_roles.contains(&role.id) => Some(role.id),
        Some(role) => {
            return Err(user_err(format!(
                "**You can't ask for the {} role.**",
                role.name
            )));
        }
        None => None,
    };

    let repository = &ctx.data().verification_repository;

    let status = repository
        .get_member_status(guild, author)
        .await
        .map_err(|err| internal_err(format!("Could not check your verification status: {err}")))?;

    match status {
        Some(MemberStatus::Authorized) => {
            return Err(user_err("**You are already verified in this server.**"))
        }
        Some(MemberStatus::Rejected) => {
            return Err(user_err("**Your verification in this server was rejected.**"))
        }
        None => {}
    }

    let pending = repository
        .get_all_pending(guild)
        .await
        .map_err(|err| internal_err(format!("Could not check pending requests: {err}")))?;

    if pending.iter().any(|request| request.author == author) {
        return Err(user_err(
            "**You already have a pending verification request.**",
        ));
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
        .verification()
        .ok_or(internal_err("Verification prompts are not running"))?;

    let request = repository
        .create(&NewVerificationRequest {
            guild,
            author,
            created_at: UtcDateTime::now(),
            answers: answers.into(),
            requested_role,
        })
        .await
        .map_err(|err| internal_err(format!("Could not store your request: {err}")))?;

    info!("Stored verification request {}", request.partial_id());

    // The request is stored either way: a failed send is retried on the next start.
    if let Err(err) = registry.track(&author_profile(ctx), request).await {
        error!("Could not post the verification prompt: {err:#}");
    }

    let message = formatdoc! {
        r#"
            **Your verification request was submitted.**

            The members of this server will vote on it. You will get {role} once it is accepted.
        "#,
        role = match requested_role {
            Some(_) => "the role you asked for",
            None => "access",
        },
    };

    ctx.send(CreateReply::default().ephemeral(true).content(message))
        .await?;

    Ok(())
}
