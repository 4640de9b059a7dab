//! Transaction-side operations feeding the scheduler
//!
//! These run while a block's transactions are applied: scope genesis,
//! proposal submission, vote casting, comments and invitation acceptance.
//! Submission snapshots the newest provision and schedules the proposal at
//! its window opening; every accepted vote pulls the proposal's schedule
//! entry forward to the current block.

use std::collections::BTreeMap;
use tracing::{debug, info};

use auton_core::{BlockContext, LedgerState, Record, TxEnvelope};

use crate::model::{
    BinaryVoteResult, Comment, Membership, Proposal, ProposalArgs, ProposalStatus, ProposalType,
    Provision, ProvisionParams, Scope, ScopeName, Vote, VoteAnswer,
};
use crate::schedule::ScheduleIndex;
use crate::{GovernanceError, GovernanceResult};

/// Founding parameters of a scope
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeGenesis {
    pub name: String,
    pub description: String,
    /// Accounts that start out as active members
    pub founders: Vec<String>,
    /// Initial provision per proposal type
    pub provisions: BTreeMap<ProposalType, ProvisionParams>,
}

impl ScopeGenesis {
    /// Same provision for every proposal type
    pub fn uniform(
        name: impl Into<String>,
        founders: Vec<String>,
        params: ProvisionParams,
    ) -> Self {
        let provisions = [
            ProposalType::NewScope,
            ProposalType::AddMember,
            ProposalType::AmendProvision,
            ProposalType::Generic,
        ]
        .into_iter()
        .map(|proposal_type| (proposal_type, params))
        .collect();

        Self {
            name: name.into(),
            description: String::new(),
            founders,
            provisions,
        }
    }
}

/// A proposal submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitProposal {
    pub scope_id: String,
    /// Submitting membership
    pub membership_id: String,
    pub title: String,
    pub args: ProposalArgs,
}

async fn load<T: Record>(state: &LedgerState, kind: &'static str, id: &str) -> GovernanceResult<T> {
    state.get_record::<T>(id).await?
        .ok_or_else(|| GovernanceError::missing(kind, id))
}

fn ensure_member_of(membership: &Membership, scope_id: &str, now: u64) -> GovernanceResult<()> {
    if membership.scope_id != scope_id {
        return Err(GovernanceError::PermissionDenied(format!(
            "membership {} does not belong to scope {}", membership.id, scope_id
        )));
    }
    if !membership.is_active(now) {
        return Err(GovernanceError::PermissionDenied(format!(
            "membership {} is not active", membership.id
        )));
    }
    Ok(())
}

fn validate_args(args: &ProposalArgs) -> GovernanceResult<()> {
    match args {
        ProposalArgs::NewScope { name, .. } if name.trim().is_empty() => Err(
            GovernanceError::InvalidProposal("scope name cannot be empty".to_string()),
        ),
        ProposalArgs::AddMember { account_id } if account_id.trim().is_empty() => Err(
            GovernanceError::InvalidProposal("account id cannot be empty".to_string()),
        ),
        ProposalArgs::AmendProvision { params, .. } => params.validate(),
        _ => Ok(()),
    }
}

/// Create a scope with its constitution and founding memberships
pub async fn establish_scope(
    state: &mut LedgerState,
    block: &mut BlockContext,
    tx: &TxEnvelope,
    genesis: ScopeGenesis,
) -> GovernanceResult<Scope> {
    let now = block.now();
    if now == 0 {
        return Err(GovernanceError::InvalidProposal(
            "scopes cannot be founded at block time 0".to_string(),
        ));
    }
    if genesis.name.trim().is_empty() {
        return Err(GovernanceError::InvalidProposal("scope name cannot be empty".to_string()));
    }
    if genesis.founders.is_empty() {
        return Err(GovernanceError::InvalidProposal(
            "a scope needs at least one founder".to_string(),
        ));
    }
    if state.get_record::<ScopeName>(&genesis.name).await?.is_some() {
        return Err(GovernanceError::InvalidProposal(format!(
            "scope name {} is already taken", genesis.name
        )));
    }
    for params in genesis.provisions.values() {
        params.validate()?;
    }

    let seed = tx.seed();
    let scope_id = block.next_id(Scope::TABLE, &seed);

    let mut constitution = BTreeMap::new();
    for (proposal_type, params) in genesis.provisions {
        let provision = Provision {
            id: block.next_id(Provision::TABLE, &seed),
            proposal_type,
            params,
            tx_id: tx.id.clone(),
        };
        state.update_record(&provision.id, &provision)?;
        constitution.insert(proposal_type, vec![provision.id]);
    }

    let mut memberships = Vec::with_capacity(genesis.founders.len());
    for account_id in genesis.founders {
        let membership = Membership {
            id: block.next_id(Membership::TABLE, &seed),
            account_id,
            scope_id: scope_id.clone(),
            started: now,
            invited: now,
            invitation_window: 0,
        };
        state.update_record(&membership.id, &membership)?;
        memberships.push(membership.id);
    }

    let scope = Scope {
        id: scope_id.clone(),
        name: genesis.name,
        description: genesis.description,
        constitution,
        memberships,
        proposals: Vec::new(),
        created: now,
    };
    state.update_record(&scope.id, &scope)?;
    state.update_record(&scope.name, &ScopeName { scope_id })?;

    info!(
        "Established scope {} ({}) with {} founders",
        scope.name,
        scope.id,
        scope.memberships.len()
    );
    Ok(scope)
}

/// Submit a proposal and schedule it at its window opening
pub async fn submit_proposal(
    state: &mut LedgerState,
    block: &mut BlockContext,
    tx: &TxEnvelope,
    request: SubmitProposal,
) -> GovernanceResult<Proposal> {
    let now = block.now();
    if request.title.trim().is_empty() {
        return Err(GovernanceError::InvalidProposal("title cannot be empty".to_string()));
    }
    validate_args(&request.args)?;

    let mut scope: Scope = load(state, "scope", &request.scope_id).await?;
    let membership: Membership = load(state, "membership", &request.membership_id).await?;
    ensure_member_of(&membership, &scope.id, now)?;

    let proposal_type = request.args.proposal_type();
    let provision_id = scope.latest_provision(proposal_type)
        .ok_or_else(|| GovernanceError::InvalidProposal(format!(
            "scope {} has no provision for {} proposals", scope.id, proposal_type
        )))?
        .to_string();
    let provision: Provision = load(state, "provision", &provision_id).await?;
    let (window_open, window_closed) = provision.params.windows(now)?;

    let proposal = Proposal {
        id: block.next_id(Proposal::TABLE, &tx.seed()),
        title: request.title,
        proposal_type,
        status: ProposalStatus::Campaigning,
        membership_id: membership.id,
        provision_id,
        scope_id: scope.id.clone(),
        comments: Vec::new(),
        votes: Vec::new(),
        created: now,
        window_open,
        window_closed,
        vote_result: BinaryVoteResult::default(),
        args: request.args,
        actions: Vec::new(),
    };

    scope.proposals.push(proposal.id.clone());
    state.update_record(&scope.id, &scope)?;
    state.update_record(&proposal.id, &proposal)?;

    let mut index = ScheduleIndex::load(state).await?;
    index.upsert(&proposal.id, window_open);
    index.save(state)?;

    info!(
        "Submitted {} proposal {} in scope {} (voting {}..{})",
        proposal_type, proposal.id, scope.id, window_open, window_closed
    );
    Ok(proposal)
}

/// Cast a ballot and pull the proposal's re-evaluation forward to now
pub async fn cast_vote(
    state: &mut LedgerState,
    block: &mut BlockContext,
    tx: &TxEnvelope,
    proposal_id: &str,
    membership_id: &str,
    answer: VoteAnswer,
) -> GovernanceResult<Vote> {
    let now = block.now();
    let mut proposal: Proposal = load(state, "proposal", proposal_id).await?;

    if proposal.status != ProposalStatus::Voting {
        return Err(GovernanceError::InvalidVote(format!(
            "proposal {} is {}, not VOTING", proposal.id, proposal.status
        )));
    }
    if now < proposal.window_open || now >= proposal.window_closed {
        return Err(GovernanceError::InvalidVote(format!(
            "voting window of proposal {} is closed", proposal.id
        )));
    }

    let membership: Membership = load(state, "membership", membership_id).await?;
    ensure_member_of(&membership, &proposal.scope_id, now)?;
    if membership.started >= proposal.created {
        return Err(GovernanceError::PermissionDenied(format!(
            "membership {} started after proposal {} was created", membership.id, proposal.id
        )));
    }

    for vote_id in &proposal.votes {
        if let Some(existing) = state.get_record::<Vote>(vote_id).await? {
            if existing.membership_id == membership.id {
                return Err(GovernanceError::InvalidVote(format!(
                    "membership {} already voted on proposal {}", membership.id, proposal.id
                )));
            }
        }
    }

    let vote = Vote {
        id: block.next_id(Vote::TABLE, &tx.seed()),
        proposal_id: proposal.id.clone(),
        membership_id: membership.id,
        answer,
        cast: now,
        tx_id: tx.id.clone(),
    };
    proposal.votes.push(vote.id.clone());

    state.update_record(&vote.id, &vote)?;
    state.update_record(&proposal.id, &proposal)?;

    let mut index = ScheduleIndex::load(state).await?;
    index.upsert(&proposal.id, now);
    index.save(state)?;

    debug!("Vote {} cast on proposal {} ({:?})", vote.id, proposal.id, answer);
    Ok(vote)
}

/// Append a comment to a proposal that has not ended
pub async fn add_comment(
    state: &mut LedgerState,
    block: &BlockContext,
    proposal_id: &str,
    membership_id: &str,
    text: &str,
) -> GovernanceResult<Proposal> {
    let now = block.now();
    let mut proposal: Proposal = load(state, "proposal", proposal_id).await?;
    if proposal.status == ProposalStatus::Ended {
        return Err(GovernanceError::InvalidProposal(format!(
            "proposal {} has ended", proposal.id
        )));
    }
    if text.trim().is_empty() {
        return Err(GovernanceError::InvalidProposal("comment cannot be empty".to_string()));
    }

    let membership: Membership = load(state, "membership", membership_id).await?;
    ensure_member_of(&membership, &proposal.scope_id, now)?;

    proposal.comments.push(Comment {
        membership_id: membership.id,
        text: text.to_string(),
        timestamp: now,
    });
    state.update_record(&proposal.id, &proposal)?;
    Ok(proposal)
}

/// Start an invited membership while its invitation is open
pub async fn accept_invitation(
    state: &mut LedgerState,
    block: &BlockContext,
    membership_id: &str,
) -> GovernanceResult<Membership> {
    let now = block.now();
    let mut membership: Membership = load(state, "membership", membership_id).await?;
    if !membership.invitation_open(now) || now == 0 {
        return Err(GovernanceError::PermissionDenied(format!(
            "invitation of membership {} is not open", membership.id
        )));
    }

    membership.started = now;
    state.update_record(&membership.id, &membership)?;
    info!("Membership {} of account {} started", membership.id, membership.account_id);
    Ok(membership)
}
