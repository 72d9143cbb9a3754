use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude::{GuildId, Mentionable};
use tracing::{debug, error, info, warn};

use crate::{
    config::{DeleteMode, VerificationConfig},
    models::{MemberStatus, PartialId, VerificationRequest, VerificationState},
    repository::VerificationRepository,
    tally::{CastOutcome, Stance, Verdict, VoteDecision},
    utils::format_submitted,
};

use super::{
    codec, ButtonKind, ChatTransport, Handled, InteractionReply, Outcome, PromptContent,
    PromptInteraction, PromptKind, UserProfile, REMOVE_ACTION,
};

pub const ACCEPT_ACTION: &str = "accept";
pub const REJECT_ACTION: &str = "reject";

const KIND: &str = "verification";
const PENDING_COLOUR: u32 = 0xf1c40f;

/// Verification requests, settled by a vote of the eligible members.
pub struct VerificationPrompts {
    config: VerificationConfig,
    repository: Arc<VerificationRepository>,
    transport: Arc<dyn ChatTransport>,
}

impl VerificationPrompts {
    pub fn new(
        config: VerificationConfig,
        repository: Arc<VerificationRepository>,
        transport: Arc<dyn ChatTransport>,
    ) -> VerificationPrompts {
        VerificationPrompts {
            config,
            repository,
            transport,
        }
    }

    /// Members who may vote right now. Read on every vote so that role
    /// changes and departures move the quorum of every pending request.
    async fn count_eligible_voters(&self, guild: GuildId) -> anyhow::Result<usize> {
        let members = self.transport.list_members(guild).await?;

        Ok(members
            .iter()
            .filter(|member| !member.bot && self.config.voters.allows(member.id, &member.roles))
            .count())
    }

    /// Grants or bans. Failures are logged and not retried.
    async fn apply_verdict(&self, request: &VerificationRequest, verdict: Verdict) {
        let guild = request.guild;
        let member = request.author;

        let status = match verdict {
            Verdict::Accepted => {
                match request.requested_role.or(self.config.default_role) {
                    Some(role) => {
                        if let Err(err) = self
                            .transport
                            .add_member_role(guild, member, role, "Verification request accepted")
                            .await
                        {
                            warn!("Could not grant role {role} to {member} in guild {guild}: {err}");
                        }
                    }
                    None => warn!("No role to grant to {member} in guild {guild}"),
                }
                MemberStatus::Authorized
            }

            Verdict::Rejected => {
                if let Err(err) = self
                    .transport
                    .ban_member(guild, member, "Verification request rejected")
                    .await
                {
                    warn!("Could not ban {member} in guild {guild}: {err}");
                }
                MemberStatus::Rejected
            }
        };

        if let Err(err) = self
            .repository
            .set_member_status(guild, member, status)
            .await
        {
            error!("Could not record {status:?} for {member} in guild {guild}: {err:#}");
        }
    }
}

fn stance_word(stance: Stance) -> &'static str {
    match stance {
        Stance::For => "accept",
        Stance::Against => "reject",
    }
}

#[async_trait]
impl PromptKind for VerificationPrompts {
    type Record = VerificationRequest;

    fn name(&self) -> &'static str {
        KIND
    }

    fn partial_id(&self, record: &VerificationRequest) -> PartialId {
        record.partial_id()
    }

    fn settled_reply(&self, record: &VerificationRequest) -> Option<String> {
        match record.state {
            VerificationState::Pending => None,
            VerificationState::Accepted => {
                Some("This verification request was already decided: accepted.".to_string())
            }
            VerificationState::Rejected => {
                Some("This verification request was already decided: rejected.".to_string())
            }
        }
    }

    async fn get_all_documents(&self, guild: GuildId) -> anyhow::Result<Vec<VerificationRequest>> {
        self.repository.get_all_pending(guild).await
    }

    async fn get_user_document(
        &self,
        partial_id: &PartialId,
    ) -> anyhow::Result<Option<VerificationRequest>> {
        self.repository.get(partial_id).await
    }

    fn get_prompt_content(
        &self,
        record: &VerificationRequest,
        author: &UserProfile,
    ) -> Result<PromptContent, codec::CodecError> {
        let partial_id = record.partial_id();

        let role = match record.requested_role.or(self.config.default_role) {
            Some(role) => role.mention().to_string(),
            None => "None".to_string(),
        };

        PromptContent::new(
            KIND,
            &partial_id,
            author,
            format!("Verification request from {}", author.name),
        )?
        .description(record.answers.clone())
        .colour(PENDING_COLOUR)
        .field("Member", author.id.mention().to_string(), true)
        .field("Role", role, true)
        .field("Submitted", format_submitted(record.created_at), false)
        .field(
            "Votes",
            format!(
                "{} to accept, {} to reject",
                record.votes.count(Stance::For),
                record.votes.count(Stance::Against)
            ),
            false,
        )
        .button(KIND, ACCEPT_ACTION, &partial_id, "Accept", ButtonKind::Success)?
        .button(KIND, REJECT_ACTION, &partial_id, "Reject", ButtonKind::Danger)?
        .button(KIND, REMOVE_ACTION, &partial_id, "Remove", ButtonKind::Secondary)
    }

    async fn handle_prompt_interaction(
        &self,
        record: &VerificationRequest,
        interaction: &PromptInteraction,
    ) -> anyhow::Result<Handled<VerificationRequest>> {
        let stance = match interaction.action.as_str() {
            ACCEPT_ACTION => Stance::For,
            REJECT_ACTION => Stance::Against,
            other => anyhow::bail!("Unsupported verification action `{other}`"),
        };

        // Checked before the tally is touched, whatever the stance.
        if let Some(reply) = self.settled_reply(record) {
            return Ok(Handled::unchanged(reply));
        }

        let actor = &interaction.actor;

        if actor.user == record.author {
            return Ok(Handled::unchanged(
                "You cannot vote on your own verification request.",
            ));
        }

        if !self.config.voters.allows(actor.user, &actor.roles) {
            return Ok(Handled::unchanged(
                "You are not allowed to vote on verification requests.",
            ));
        }

        let mut request = record.clone();

        // A first vote is acknowledged silently, a changed vote is confirmed.
        let reply = match request.votes.cast(actor.user, stance) {
            CastOutcome::AlreadyCast => {
                return Ok(Handled::unchanged(format!(
                    "You already voted to {} this request.",
                    stance_word(stance)
                )));
            }
            CastOutcome::StanceChanged => {
                InteractionReply::ephemeral(format!("Changed your vote to {}.", stance_word(stance)))
            }
            CastOutcome::Cast => InteractionReply::Acknowledge,
        };

        let eligible_voters = self.count_eligible_voters(request.guild).await?;
        let decision = VoteDecision::compute(
            &request.votes,
            &self.config.acceptance,
            &self.config.rejection,
            eligible_voters,
        );

        debug!(
            "{} voted to {} {}: {decision:?} of {eligible_voters} eligible voters",
            actor.user,
            stance_word(stance),
            request.partial_id()
        );

        let Some(verdict) = decision.verdict() else {
            self.repository.save_votes(&request).await?;

            return Ok(Handled {
                outcome: Outcome::Updated(request),
                reply,
            });
        };

        request.state = match verdict {
            Verdict::Accepted => VerificationState::Accepted,
            Verdict::Rejected => VerificationState::Rejected,
        };

        if let Err(err) = self.repository.save_votes(&request).await {
            error!(
                "Could not store the verdict for {}: {err:#}",
                request.partial_id()
            );
        }

        self.apply_verdict(&request, verdict).await;

        info!(
            "Verification request {} settled: {verdict:?}",
            request.partial_id()
        );

        Ok(Handled {
            outcome: Outcome::Terminal,
            reply,
        })
    }

    /// Requests are always deleted, whatever the delete mode.
    async fn remove_document(
        &self,
        record: &VerificationRequest,
        mode: DeleteMode,
    ) -> anyhow::Result<()> {
        if !self.repository.delete(record.id).await? {
            debug!(
                "Verification request {} was already gone ({mode:?})",
                record.partial_id()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use poise::serenity_prelude::{RoleId, UserId};
    use test_log::test;

    use super::{VerificationPrompts, ACCEPT_ACTION, REJECT_ACTION};
    use crate::{
        config::{AllowList, DeleteMode, VerificationConfig},
        models::{
            types::UtcDateTime, MemberStatus, NewVerificationRequest, PartialId,
            VerificationState,
        },
        prompts::{
            testing::{actor, interaction, FakeTransport, CHANNEL, GUILD},
            InteractionReply, PromptRegistry, REMOVE_ACTION,
        },
        repository::{test_pool, VerificationRepository},
        tally::{QuorumPolicy, Stance},
    };

    const AUTHOR: u64 = 2;
    const VOTER_ROLE: u64 = 50;
    const REQUESTED_ROLE: u64 = 60;
    const MODERATOR_ROLE: u64 = 70;

    struct Fixture {
        transport: Arc<FakeTransport>,
        repository: Arc<VerificationRepository>,
        registry: PromptRegistry<VerificationPrompts>,
        partial_id: PartialId,
    }

    impl Fixture {
        async fn new(acceptance: QuorumPolicy, rejection: QuorumPolicy) -> Fixture {
            let transport = Arc::new(FakeTransport::new());
            transport.add_user(AUTHOR);
            for voter in [11, 12, 13] {
                transport.add_member(voter, false, &[VOTER_ROLE]);
            }
            transport.add_member(14, true, &[VOTER_ROLE]);
            transport.add_member(15, false, &[]);

            let repository = Arc::new(VerificationRepository::new(test_pool().await));
            let request = repository
                .create(&NewVerificationRequest {
                    guild: GUILD,
                    author: UserId::new(AUTHOR),
                    created_at: UtcDateTime::from_unix_millis(1_700_000_000_000).unwrap(),
                    answers: "I run the community wiki".to_string(),
                    requested_role: Some(RoleId::new(REQUESTED_ROLE)),
                })
                .await
                .unwrap();

            let config = VerificationConfig {
                channel: CHANNEL,
                management: AllowList {
                    roles: vec![RoleId::new(MODERATOR_ROLE)],
                    users: Vec::new(),
                },
                delete_mode: DeleteMode::Close,
                voters: AllowList {
                    roles: vec![RoleId::new(VOTER_ROLE)],
                    users: Vec::new(),
                },
                acceptance,
                rejection,
                default_role: None,
                requestable_roles: vec![RoleId::new(REQUESTED_ROLE)],
            };

            let registry = PromptRegistry::new(
                GUILD,
                CHANNEL,
                config.management.clone(),
                config.delete_mode,
                VerificationPrompts::new(config, repository.clone(), transport.clone()),
                transport.clone(),
            );
            registry.start().await.unwrap();

            Fixture {
                transport,
                repository,
                registry,
                partial_id: request.partial_id(),
            }
        }

        async fn press(&self, action: &str, voter: u64) -> InteractionReply {
            let roles: &[u64] = if voter == 15 { &[] } else { &[VOTER_ROLE] };
            self.registry
                .handle_interaction(interaction(action, self.partial_id, actor(voter, roles)))
                .await
        }

        async fn stored_state(&self) -> VerificationState {
            self.repository
                .get(&self.partial_id)
                .await
                .unwrap()
                .unwrap()
                .state
        }
    }

    #[test(tokio::test)]
    async fn second_accept_settles_request() {
        let fixture = Fixture::new(QuorumPolicy::Number(2), QuorumPolicy::Number(3)).await;

        assert_eq!(
            fixture.press(ACCEPT_ACTION, 11).await,
            InteractionReply::Acknowledge
        );
        assert_eq!(fixture.stored_state().await, VerificationState::Pending);
        assert_eq!(fixture.transport.messages(CHANNEL).len(), 1);

        assert_eq!(
            fixture.press(ACCEPT_ACTION, 12).await,
            InteractionReply::Acknowledge
        );
        assert_eq!(fixture.stored_state().await, VerificationState::Accepted);
        assert_eq!(
            fixture.transport.role_grants(),
            vec![(UserId::new(AUTHOR), RoleId::new(REQUESTED_ROLE))]
        );
        assert!(fixture.transport.messages(CHANNEL).is_empty());
        assert_eq!(
            fixture
                .repository
                .get_member_status(GUILD, UserId::new(AUTHOR))
                .await
                .unwrap(),
            Some(MemberStatus::Authorized)
        );

        assert_eq!(
            fixture.press(ACCEPT_ACTION, 13).await,
            InteractionReply::ephemeral("This verification request was already decided: accepted.")
        );
        assert_eq!(
            fixture.press(REJECT_ACTION, 13).await,
            InteractionReply::ephemeral("This verification request was already decided: accepted.")
        );
        assert_eq!(fixture.transport.role_grants().len(), 1);
        assert!(fixture.transport.bans().is_empty());
    }

    #[test(tokio::test)]
    async fn vote_updates_the_prompt() {
        let fixture = Fixture::new(QuorumPolicy::Number(3), QuorumPolicy::Number(3)).await;

        fixture.press(ACCEPT_ACTION, 11).await;

        let prompt = fixture.registry.prompt(&fixture.partial_id).await.unwrap();
        let content = fixture.transport.content(prompt.message_id).unwrap();
        let votes = content
            .fields
            .iter()
            .find(|field| field.name == "Votes")
            .unwrap();

        assert_eq!(votes.value, "1 to accept, 0 to reject");
        assert_eq!(fixture.transport.messages(CHANNEL).len(), 1);
    }

    #[test(tokio::test)]
    async fn repeated_vote_is_reported_and_not_counted() {
        let fixture = Fixture::new(QuorumPolicy::Number(3), QuorumPolicy::Number(3)).await;

        fixture.press(ACCEPT_ACTION, 11).await;
        let reply = fixture.press(ACCEPT_ACTION, 11).await;

        assert_eq!(
            reply,
            InteractionReply::ephemeral("You already voted to accept this request.")
        );

        let stored = fixture.repository.get(&fixture.partial_id).await.unwrap().unwrap();
        assert_eq!(stored.votes.count(Stance::For), 1);
    }

    #[test(tokio::test)]
    async fn changed_vote_moves_voter_and_is_confirmed() {
        let fixture = Fixture::new(QuorumPolicy::Number(3), QuorumPolicy::Number(3)).await;

        let first = fixture.press(ACCEPT_ACTION, 11).await;
        let changed = fixture.press(REJECT_ACTION, 11).await;

        // Only the change gets a reply.
        assert_eq!(first, InteractionReply::Acknowledge);
        assert_eq!(
            changed,
            InteractionReply::ephemeral("Changed your vote to reject.")
        );

        let stored = fixture.repository.get(&fixture.partial_id).await.unwrap().unwrap();
        assert_eq!(stored.votes.count(Stance::For), 0);
        assert_eq!(stored.votes.count(Stance::Against), 1);
        assert_eq!(stored.votes.stance_of(UserId::new(11)), Some(Stance::Against));
    }

    #[test(tokio::test)]
    async fn ineligible_members_cannot_vote() {
        let fixture = Fixture::new(QuorumPolicy::Number(1), QuorumPolicy::Number(1)).await;

        assert_eq!(
            fixture.press(ACCEPT_ACTION, 15).await,
            InteractionReply::ephemeral("You are not allowed to vote on verification requests.")
        );
        assert_eq!(
            fixture
                .registry
                .handle_interaction(interaction(
                    ACCEPT_ACTION,
                    fixture.partial_id,
                    actor(AUTHOR, &[VOTER_ROLE])
                ))
                .await,
            InteractionReply::ephemeral("You cannot vote on your own verification request.")
        );
        assert_eq!(fixture.stored_state().await, VerificationState::Pending);
    }

    #[test(tokio::test)]
    async fn rejection_bans_author() {
        let fixture = Fixture::new(QuorumPolicy::Number(3), QuorumPolicy::Number(1)).await;

        fixture.press(REJECT_ACTION, 12).await;

        assert_eq!(fixture.stored_state().await, VerificationState::Rejected);
        assert_eq!(fixture.transport.bans(), vec![UserId::new(AUTHOR)]);
        assert!(fixture.transport.role_grants().is_empty());
        assert_eq!(
            fixture
                .repository
                .get_member_status(GUILD, UserId::new(AUTHOR))
                .await
                .unwrap(),
            Some(MemberStatus::Rejected)
        );
    }

    #[test(tokio::test)]
    async fn quorum_follows_current_population() {
        let fixture = Fixture::new(QuorumPolicy::Fraction(0.75), QuorumPolicy::Number(3)).await;
        fixture.transport.add_member(16, false, &[VOTER_ROLE]);

        // Four eligible voters need three votes.
        fixture.press(ACCEPT_ACTION, 11).await;
        assert_eq!(fixture.stored_state().await, VerificationState::Pending);

        // Two eligible voters need two.
        fixture.transport.remove_member(13);
        fixture.transport.remove_member(16);
        fixture.press(ACCEPT_ACTION, 12).await;

        assert_eq!(fixture.stored_state().await, VerificationState::Accepted);
    }

    #[test(tokio::test)]
    async fn concurrent_votes_settle_once() {
        let fixture = Fixture::new(QuorumPolicy::Number(1), QuorumPolicy::Number(1)).await;

        let (first, second) = tokio::join!(
            fixture.press(ACCEPT_ACTION, 11),
            fixture.press(ACCEPT_ACTION, 12)
        );

        let replies = [first, second];
        assert!(replies.contains(&InteractionReply::Acknowledge));
        assert!(replies.contains(&InteractionReply::ephemeral(
            "This verification request was already decided: accepted."
        )));
        assert_eq!(fixture.transport.role_grants().len(), 1);

        let stored = fixture.repository.get(&fixture.partial_id).await.unwrap().unwrap();
        assert_eq!(stored.votes.count(Stance::For), 1);
    }

    #[test(tokio::test)]
    async fn removal_deletes_request_even_in_close_mode() {
        let fixture = Fixture::new(QuorumPolicy::Number(3), QuorumPolicy::Number(3)).await;

        let reply = fixture
            .registry
            .handle_interaction(interaction(
                REMOVE_ACTION,
                fixture.partial_id,
                actor(99, &[MODERATOR_ROLE]),
            ))
            .await;

        assert_eq!(
            reply,
            InteractionReply::ephemeral("Closed the verification prompt.")
        );
        assert!(fixture.repository.get(&fixture.partial_id).await.unwrap().is_none());
        assert!(fixture.transport.messages(CHANNEL).is_empty());
    }

    #[test(tokio::test)]
    async fn only_pending_requests_get_prompts() {
        let fixture = Fixture::new(QuorumPolicy::Number(1), QuorumPolicy::Number(3)).await;
        fixture.press(ACCEPT_ACTION, 11).await;

        fixture.registry.stop().await;
        let report = fixture.registry.start().await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.adopted, 0);
        assert!(fixture.transport.messages(CHANNEL).is_empty());
    }
}
