//! Governance records
//!
//! Everything here is persisted through [`auton_core::LedgerState`]. Maps are
//! `BTreeMap`s so that serialized state is identical on every replica.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};

use auton_core::Record;

use crate::{GovernanceError, GovernanceResult};

/// Lifecycle status of a proposal
///
/// Ordered: a proposal only ever moves to a greater status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Open for discussion, not yet for votes
    Campaigning,
    /// Open for votes
    Voting,
    /// Outcome frozen, waiting for the voting window to close
    Decided,
    /// Finished; no longer scheduled
    Ended,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalStatus::Campaigning => "CAMPAIGNING",
            ProposalStatus::Voting => "VOTING",
            ProposalStatus::Decided => "DECIDED",
            ProposalStatus::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

/// Governance action a proposal asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProposalType {
    /// Create a new governance scope
    NewScope,
    /// Invite an account into the scope
    AddMember,
    /// Append a new provision to the constitution
    AmendProvision,
    /// Text-only resolution without side effects
    Generic,
}

impl fmt::Display for ProposalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Type-specific arguments of a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProposalArgs {
    NewScope {
        name: String,
        description: String,
    },
    AddMember {
        account_id: String,
    },
    AmendProvision {
        target: ProposalType,
        params: ProvisionParams,
    },
    Generic {
        body: String,
    },
}

impl ProposalArgs {
    /// The proposal type these arguments belong to
    pub fn proposal_type(&self) -> ProposalType {
        match self {
            ProposalArgs::NewScope { .. } => ProposalType::NewScope,
            ProposalArgs::AddMember { .. } => ProposalType::AddMember,
            ProposalArgs::AmendProvision { .. } => ProposalType::AmendProvision,
            ProposalArgs::Generic { .. } => ProposalType::Generic,
        }
    }
}

/// Outcome of a binary vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteResult {
    Undecided,
    Accepted,
    Rejected,
}

impl VoteResult {
    /// Whether the outcome is final
    pub fn is_settled(&self) -> bool {
        !matches!(self, VoteResult::Undecided)
    }
}

/// Frozen tally of a binary vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryVoteResult {
    pub result: VoteResult,
    /// Active members counted as the denominator
    pub member_count: u64,
    pub accepted_count: u64,
    pub refused_count: u64,
    /// Block time of the decision, 0 while undecided
    pub decided: u64,
}

impl Default for BinaryVoteResult {
    fn default() -> Self {
        Self {
            result: VoteResult::Undecided,
            member_count: 0,
            accepted_count: 0,
            refused_count: 0,
            decided: 0,
        }
    }
}

/// An entry of a proposal's side-effect log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// What happened, e.g. `scope-created`
    pub kind: String,
    /// Id of the record the action created or changed
    pub target_id: String,
    pub height: u64,
    pub timestamp: u64,
}

/// A governance proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub proposal_type: ProposalType,
    pub status: ProposalStatus,
    /// Submitting membership
    pub membership_id: String,
    /// Provision snapshot taken at creation
    pub provision_id: String,
    pub scope_id: String,
    pub comments: Vec<Comment>,
    /// Vote ids, in casting order
    pub votes: Vec<String>,
    pub created: u64,
    pub window_open: u64,
    pub window_closed: u64,
    pub vote_result: BinaryVoteResult,
    pub args: ProposalArgs,
    /// Append-only
    pub actions: Vec<ActionRecord>,
}

impl Record for Proposal {
    const TABLE: &'static str = "proposals";
}

/// A comment on a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub membership_id: String,
    pub text: String,
    pub timestamp: u64,
}

/// Thresholds and timing of a provision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionParams {
    /// Quorum percentage, 0-100
    pub attendance: u8,
    /// Acceptance percentage, 0-100
    pub acceptance: u8,
    /// Campaigning window in minutes
    pub campaigning: u64,
    /// Voting window in minutes
    pub voting_window: u64,
    pub exec_after_end: bool,
}

impl ProvisionParams {
    /// Check percentages and window arithmetic
    pub fn validate(&self) -> GovernanceResult<()> {
        if self.attendance > 100 {
            return Err(GovernanceError::InvalidProvision(
                format!("attendance {} exceeds 100", self.attendance)
            ));
        }
        if self.acceptance > 100 {
            return Err(GovernanceError::InvalidProvision(
                format!("acceptance {} exceeds 100", self.acceptance)
            ));
        }
        let total = self.campaigning.checked_add(self.voting_window)
            .and_then(|minutes| minutes.checked_mul(60));
        if total.is_none() {
            return Err(GovernanceError::InvalidProvision(
                "campaigning and voting windows overflow".to_string()
            ));
        }
        Ok(())
    }

    /// `(window_open, window_closed)` for a proposal created at `created`
    pub fn windows(&self, created: u64) -> GovernanceResult<(u64, u64)> {
        let window_open = self.campaigning.checked_mul(60)
            .and_then(|secs| created.checked_add(secs));
        let window_closed = window_open.and_then(|open| {
            self.voting_window.checked_mul(60).and_then(|secs| open.checked_add(secs))
        });

        match (window_open, window_closed) {
            (Some(open), Some(closed)) => Ok((open, closed)),
            _ => Err(GovernanceError::InvalidProvision(
                "proposal windows overflow".to_string()
            )),
        }
    }
}

impl Default for ProvisionParams {
    fn default() -> Self {
        Self {
            attendance: 51,
            acceptance: 51,
            campaigning: 0,
            voting_window: 60 * 24 * 7,
            exec_after_end: false,
        }
    }
}

/// An immutable, versioned parameter snapshot for one proposal type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provision {
    pub id: String,
    pub proposal_type: ProposalType,
    pub params: ProvisionParams,
    /// Originating transaction
    pub tx_id: String,
}

impl Record for Provision {
    const TABLE: &'static str = "provisions";
}

/// Answer of a binary vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteAnswer {
    Accept,
    Refuse,
    Abstain,
}

/// A ballot cast by a membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub proposal_id: String,
    pub membership_id: String,
    pub answer: VoteAnswer,
    /// Block time the vote was cast
    pub cast: u64,
    pub tx_id: String,
}

impl Record for Vote {
    const TABLE: &'static str = "votes";
}

/// An account's standing within a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub account_id: String,
    pub scope_id: String,
    /// 0 while the invitation has not been accepted
    pub started: u64,
    pub invited: u64,
    /// Invitation window in minutes
    pub invitation_window: u64,
}

impl Membership {
    /// Started and not in the future
    pub fn is_active(&self, now: u64) -> bool {
        self.started != 0 && self.started <= now
    }

    /// Whether an invitation can still be accepted at `now`
    pub fn invitation_open(&self, now: u64) -> bool {
        self.started == 0
            && now <= self.invited.saturating_add(self.invitation_window.saturating_mul(60))
    }
}

impl Record for Membership {
    const TABLE: &'static str = "memberships";
}

/// A governance unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Per proposal type, provision ids oldest first
    pub constitution: BTreeMap<ProposalType, Vec<String>>,
    pub memberships: Vec<String>,
    pub proposals: Vec<String>,
    pub created: u64,
}

impl Scope {
    /// The authoritative provision for new proposals of `proposal_type`
    pub fn latest_provision(&self, proposal_type: ProposalType) -> Option<&str> {
        self.constitution
            .get(&proposal_type)
            .and_then(|provisions| provisions.last())
            .map(String::as_str)
    }
}

impl Record for Scope {
    const TABLE: &'static str = "scopes";
}

/// Name uniqueness marker for scopes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeName {
    pub scope_id: String,
}

impl Record for ScopeName {
    const TABLE: &'static str = "scope-names";
}
