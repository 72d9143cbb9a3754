use poise::serenity_prelude::{GuildId, RoleId, UserId};

use crate::tally::VoterSets;

use super::{types::UtcDateTime, PartialId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VerificationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationState {
    Pending,
    Accepted,
    Rejected,
}

impl VerificationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationState::Pending)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VerificationRequest {
    pub id: VerificationId,
    pub guild: GuildId,
    pub author: UserId,
    pub created_at: UtcDateTime,
    pub answers: String,
    pub requested_role: Option<RoleId>,
    pub state: VerificationState,
    pub votes: VoterSets,
}

impl VerificationRequest {
    pub fn partial_id(&self) -> PartialId {
        PartialId::new(self.guild, self.author, self.created_at)
    }
}

#[derive(Debug)]
pub struct NewVerificationRequest {
    pub guild: GuildId,
    pub author: UserId,
    pub created_at: UtcDateTime,
    pub answers: String,
    pub requested_role: Option<RoleId>,
}

/// Outcome of verification recorded per member, independent of the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Authorized,
    Rejected,
}
