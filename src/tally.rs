//! Quorum arithmetic and voter bookkeeping for verification requests.
//!
//! Nothing here is cached: a [`VoteDecision`] is computed from the voter sets
//! and the eligible population at the moment a vote lands.

use std::collections::BTreeSet;

use poise::serenity_prelude::UserId;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stance {
    For,
    Against,
}

/// The two disjoint sets of members who voted on a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoterSets {
    voted_for: BTreeSet<UserId>,
    voted_against: BTreeSet<UserId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastOutcome {
    /// First vote of this member.
    Cast,
    /// The member moved from the opposite side.
    StanceChanged,
    /// The member pressed the side they are already on.
    AlreadyCast,
}

impl VoterSets {
    pub fn from_votes(votes: impl IntoIterator<Item = (UserId, Stance)>) -> VoterSets {
        let mut sets = VoterSets::default();
        for (voter, stance) in votes {
            sets.cast(voter, stance);
        }
        sets
    }

    pub fn cast(&mut self, voter: UserId, stance: Stance) -> CastOutcome {
        let (pressed, opposite) = match stance {
            Stance::For => (&mut self.voted_for, &mut self.voted_against),
            Stance::Against => (&mut self.voted_against, &mut self.voted_for),
        };

        if pressed.contains(&voter) {
            return CastOutcome::AlreadyCast;
        }

        let outcome = if opposite.remove(&voter) {
            CastOutcome::StanceChanged
        } else {
            CastOutcome::Cast
        };

        pressed.insert(voter);
        outcome
    }

    pub fn stance_of(&self, voter: UserId) -> Option<Stance> {
        if self.voted_for.contains(&voter) {
            Some(Stance::For)
        } else if self.voted_against.contains(&voter) {
            Some(Stance::Against)
        } else {
            None
        }
    }

    pub fn count(&self, stance: Stance) -> usize {
        match stance {
            Stance::For => self.voted_for.len(),
            Stance::Against => self.voted_against.len(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, Stance)> + '_ {
        self.voted_for
            .iter()
            .map(|voter| (*voter, Stance::For))
            .chain(self.voted_against.iter().map(|voter| (*voter, Stance::Against)))
    }
}

/// How many votes one side needs.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum QuorumPolicy {
    /// A share of the eligible voters, rounded up.
    Fraction(f64),
    /// A fixed number of votes.
    Number(u32),
}

impl QuorumPolicy {
    /// Never less than one vote, otherwise a request would settle on creation.
    pub fn required(&self, eligible_voters: usize) -> usize {
        let required = match *self {
            QuorumPolicy::Fraction(fraction) => (fraction * eligible_voters as f64).ceil() as usize,
            QuorumPolicy::Number(number) => number as usize,
        };

        required.max(1)
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            QuorumPolicy::Fraction(fraction) => fraction > 0.0 && fraction <= 1.0,
            QuorumPolicy::Number(_) => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Threshold {
    pub required: usize,
    pub remaining: usize,
}

impl Threshold {
    fn new(required: usize, votes: usize) -> Threshold {
        Threshold {
            required,
            remaining: required.saturating_sub(votes),
        }
    }

    pub fn is_met(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteDecision {
    pub acceptance: Threshold,
    pub rejection: Threshold,
}

impl VoteDecision {
    pub fn compute(
        votes: &VoterSets,
        acceptance: &QuorumPolicy,
        rejection: &QuorumPolicy,
        eligible_voters: usize,
    ) -> VoteDecision {
        VoteDecision {
            acceptance: Threshold::new(
                acceptance.required(eligible_voters),
                votes.count(Stance::For),
            ),
            rejection: Threshold::new(
                rejection.required(eligible_voters),
                votes.count(Stance::Against),
            ),
        }
    }

    /// Acceptance is checked first, so a vote crossing both bars accepts.
    pub fn verdict(&self) -> Option<Verdict> {
        if self.acceptance.is_met() {
            Some(Verdict::Accepted)
        } else if self.rejection.is_met() {
            Some(Verdict::Rejected)
        } else {
            None
        }
    }
}
