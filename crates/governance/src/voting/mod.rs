//! Vote tally engine
//!
//! Thresholds are compared by cross-multiplication in integers, so
//! `count / active > pct / 100` becomes `count * 100 > pct * active`.
//! No floating point is involved and every replica reaches the same
//! verdict. Support uses a strict comparison, resistance an inclusive
//! one.

use serde::{Deserialize, Serialize};

use auton_core::LedgerState;

use crate::model::{Membership, Proposal, ProvisionParams, Scope, Vote, VoteAnswer, VoteResult};
use crate::{GovernanceError, GovernanceResult};

/// Vote counts of a proposal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub accept_count: u64,
    pub refuse_count: u64,
    /// Every loaded ballot, abstentions included
    pub total_votes: u64,
}

/// Tally of a proposal together with its verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyOutcome {
    pub tally: VoteTally,
    pub total_active: u64,
    pub verdict: VoteResult,
}

/// Count ballots by answer
///
/// Duplicate ballots from one membership are counted as they are.
pub fn count_votes(votes: &[Vote]) -> VoteTally {
    let mut tally = VoteTally::default();
    for vote in votes {
        match vote.answer {
            VoteAnswer::Accept => tally.accept_count += 1,
            VoteAnswer::Refuse => tally.refuse_count += 1,
            VoteAnswer::Abstain => {}
        }
        tally.total_votes += 1;
    }
    tally
}

/// Members eligible to count towards a proposal's denominator
///
/// A membership must have started, not in the future, and strictly before
/// the proposal was created.
pub fn count_active_members(memberships: &[Membership], proposal: &Proposal, now: u64) -> u64 {
    memberships
        .iter()
        .filter(|m| m.is_active(now) && m.started < proposal.created)
        .count() as u64
}

/// `count / total_active > percent / 100`
fn exceeds(count: u64, percent: u64, total_active: u64) -> bool {
    (count as u128) * 100 > (percent as u128) * (total_active as u128)
}

/// `count / total_active >= percent / 100`
fn reaches(count: u64, percent: u64, total_active: u64) -> bool {
    (count as u128) * 100 >= (percent as u128) * (total_active as u128)
}

/// Participation strictly above the attendance percentage
pub fn quorum_reached(params: &ProvisionParams, total_active: u64, tally: &VoteTally) -> bool {
    total_active > 0 && exceeds(tally.total_votes, params.attendance as u64, total_active)
}

/// Quorum and acceptances strictly above the acceptance percentage
pub fn support_reached(params: &ProvisionParams, total_active: u64, tally: &VoteTally) -> bool {
    quorum_reached(params, total_active, tally)
        && exceeds(tally.accept_count, params.acceptance as u64, total_active)
}

/// Quorum and refusals at or above `100 - acceptance` percent
pub fn resistance_reached(params: &ProvisionParams, total_active: u64, tally: &VoteTally) -> bool {
    let threshold = 100u64.saturating_sub(params.acceptance as u64);
    quorum_reached(params, total_active, tally)
        && reaches(tally.refuse_count, threshold, total_active)
}

/// Decide from counts; support wins when both thresholds are met
pub fn verdict(params: &ProvisionParams, total_active: u64, tally: &VoteTally) -> VoteResult {
    if support_reached(params, total_active, tally) {
        VoteResult::Accepted
    } else if resistance_reached(params, total_active, tally) {
        VoteResult::Rejected
    } else {
        VoteResult::Undecided
    }
}

/// Load every ballot of a proposal
pub async fn load_votes(state: &LedgerState, proposal: &Proposal) -> GovernanceResult<Vec<Vote>> {
    let mut votes = Vec::with_capacity(proposal.votes.len());
    for vote_id in &proposal.votes {
        let vote = state.get_record::<Vote>(vote_id).await?
            .ok_or_else(|| GovernanceError::missing("vote", vote_id.as_str()))?;
        votes.push(vote);
    }
    Ok(votes)
}

/// Load every membership of a scope
pub async fn load_memberships(
    state: &LedgerState,
    scope: &Scope,
) -> GovernanceResult<Vec<Membership>> {
    let mut memberships = Vec::with_capacity(scope.memberships.len());
    for membership_id in &scope.memberships {
        let membership = state.get_record::<Membership>(membership_id).await?
            .ok_or_else(|| GovernanceError::missing("membership", membership_id.as_str()))?;
        memberships.push(membership);
    }
    Ok(memberships)
}

/// Tally a proposal as of `now`
///
/// Fails with `MissingReference` when a ballot or membership cannot be loaded.
pub async fn tally_proposal(
    state: &LedgerState,
    proposal: &Proposal,
    scope: &Scope,
    params: &ProvisionParams,
    now: u64,
) -> GovernanceResult<TallyOutcome> {
    let votes = load_votes(state, proposal).await?;
    let memberships = load_memberships(state, scope).await?;

    let tally = count_votes(&votes);
    let total_active = count_active_members(&memberships, proposal, now);

    Ok(TallyOutcome {
        tally,
        total_active,
        verdict: verdict(params, total_active, &tally),
    })
}
