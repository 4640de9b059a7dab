//! Built-in settlement handlers
//!
//! Each handler only acts on accepted proposals. Shared indices (scope
//! names, scope membership lists) are re-read from the ledger state before
//! being changed, since another settlement earlier in the same block may
//! already have touched them.

use async_trait::async_trait;
use tracing::info;

use auton_core::{BlockContext, LedgerState, Record};

use super::{ActionHandler, Settlement};
use crate::model::{
    ActionRecord, Membership, ProposalArgs, ProposalType, Provision, ProvisionParams, Scope,
    ScopeName, VoteResult,
};
use crate::{GovernanceError, GovernanceResult};

fn action(kind: &str, target_id: &str, block: &BlockContext) -> ActionRecord {
    ActionRecord {
        kind: kind.to_string(),
        target_id: target_id.to_string(),
        height: block.height(),
        timestamp: block.now(),
    }
}

fn mismatched(settlement: &Settlement<'_>, expected: ProposalType) -> GovernanceError {
    GovernanceError::InvalidProposal(format!(
        "proposal {} carries {:?} arguments, expected {}",
        settlement.proposal_id,
        settlement.proposal.args.proposal_type(),
        expected
    ))
}

async fn current_scope(state: &LedgerState, scope_id: &str) -> GovernanceResult<Scope> {
    state
        .get_record::<Scope>(scope_id)
        .await?
        .ok_or_else(|| GovernanceError::missing("scope", scope_id))
}

/// Creates a new scope when a `NewScope` proposal is accepted
#[derive(Debug, Clone)]
pub struct NewScopeHandler {
    /// Provision used for proposal types the parent constitution lacks
    founding_provision: ProvisionParams,
}

impl NewScopeHandler {
    pub fn new(founding_provision: ProvisionParams) -> Self {
        Self { founding_provision }
    }
}

#[async_trait]
impl ActionHandler for NewScopeHandler {
    fn proposal_type(&self) -> ProposalType {
        ProposalType::NewScope
    }

    async fn process(
        &self,
        settlement: &Settlement<'_>,
        state: &mut LedgerState,
        block: &mut BlockContext,
    ) -> GovernanceResult<Vec<ActionRecord>> {
        if settlement.result != VoteResult::Accepted {
            return Ok(Vec::new());
        }
        let ProposalArgs::NewScope { name, description } = &settlement.proposal.args else {
            return Err(mismatched(settlement, ProposalType::NewScope));
        };

        if state.get_record::<ScopeName>(name).await?.is_some() {
            return Err(GovernanceError::InvalidProposal(format!(
                "scope name {} is already taken", name
            )));
        }

        let submitter_id = settlement.proposal.membership_id.as_str();
        let submitter = state
            .get_record::<Membership>(submitter_id)
            .await?
            .ok_or_else(|| GovernanceError::missing("membership", submitter_id))?;

        let seed = block.block_seed();
        let mut actions = Vec::new();

        // the parent may have been amended earlier in this block
        let mut constitution = current_scope(state, &settlement.scope.id).await?.constitution;
        for proposal_type in [
            ProposalType::NewScope,
            ProposalType::AddMember,
            ProposalType::AmendProvision,
            ProposalType::Generic,
        ] {
            if constitution.get(&proposal_type).map_or(false, |p| !p.is_empty()) {
                continue;
            }
            let provision = Provision {
                id: block.next_id(Provision::TABLE, &seed),
                proposal_type,
                params: self.founding_provision,
                tx_id: settlement.proposal_id.to_string(),
            };
            state.update_record(&provision.id, &provision)?;
            actions.push(action("provision-created", &provision.id, block));
            constitution.insert(proposal_type, vec![provision.id]);
        }

        let scope_id = block.next_id(Scope::TABLE, &seed);
        let membership = Membership {
            id: block.next_id(Membership::TABLE, &seed),
            account_id: submitter.account_id,
            scope_id: scope_id.clone(),
            started: block.now(),
            invited: block.now(),
            invitation_window: 0,
        };
        let scope = Scope {
            id: scope_id.clone(),
            name: name.clone(),
            description: description.clone(),
            constitution,
            memberships: vec![membership.id.clone()],
            proposals: Vec::new(),
            created: block.now(),
        };

        state.update_record(&membership.id, &membership)?;
        state.update_record(&scope.id, &scope)?;
        state.update_record(name, &ScopeName { scope_id: scope_id.clone() })?;

        info!("Created scope {} ({}) from proposal {}", name, scope_id, settlement.proposal_id);
        actions.push(action("scope-created", &scope_id, block));
        actions.push(action("membership-created", &membership.id, block));
        Ok(actions)
    }
}

/// Invites an account into the scope when an `AddMember` proposal is accepted
#[derive(Debug, Clone)]
pub struct AddMemberHandler {
    /// Minutes the invitee has to accept
    invitation_window: u64,
}

impl AddMemberHandler {
    pub fn new(invitation_window: u64) -> Self {
        Self { invitation_window }
    }
}

#[async_trait]
impl ActionHandler for AddMemberHandler {
    fn proposal_type(&self) -> ProposalType {
        ProposalType::AddMember
    }

    async fn process(
        &self,
        settlement: &Settlement<'_>,
        state: &mut LedgerState,
        block: &mut BlockContext,
    ) -> GovernanceResult<Vec<ActionRecord>> {
        if settlement.result != VoteResult::Accepted {
            return Ok(Vec::new());
        }
        let ProposalArgs::AddMember { account_id } = &settlement.proposal.args else {
            return Err(mismatched(settlement, ProposalType::AddMember));
        };

        let mut scope = current_scope(state, &settlement.scope.id).await?;
        for membership_id in &scope.memberships {
            let existing = state.get_record::<Membership>(membership_id).await?;
            if existing.map_or(false, |m| &m.account_id == account_id) {
                return Err(GovernanceError::InvalidProposal(format!(
                    "account {} already holds a membership in scope {}", account_id, scope.id
                )));
            }
        }

        let membership = Membership {
            id: block.next_id(Membership::TABLE, &block.block_seed()),
            account_id: account_id.clone(),
            scope_id: scope.id.clone(),
            started: 0,
            invited: block.now(),
            invitation_window: self.invitation_window,
        };
        scope.memberships.push(membership.id.clone());

        state.update_record(&membership.id, &membership)?;
        state.update_record(&scope.id, &scope)?;

        info!("Invited account {} into scope {}", account_id, scope.id);
        Ok(vec![action("member-invited", &membership.id, block)])
    }
}

/// Appends a provision to the constitution when an `AmendProvision` proposal is accepted
#[derive(Debug, Clone, Copy, Default)]
pub struct AmendProvisionHandler;

#[async_trait]
impl ActionHandler for AmendProvisionHandler {
    fn proposal_type(&self) -> ProposalType {
        ProposalType::AmendProvision
    }

    async fn process(
        &self,
        settlement: &Settlement<'_>,
        state: &mut LedgerState,
        block: &mut BlockContext,
    ) -> GovernanceResult<Vec<ActionRecord>> {
        if settlement.result != VoteResult::Accepted {
            return Ok(Vec::new());
        }
        let ProposalArgs::AmendProvision { target, params } = &settlement.proposal.args else {
            return Err(mismatched(settlement, ProposalType::AmendProvision));
        };
        params.validate()?;

        let provision = Provision {
            id: block.next_id(Provision::TABLE, &block.block_seed()),
            proposal_type: *target,
            params: *params,
            tx_id: settlement.proposal_id.to_string(),
        };

        let mut scope = current_scope(state, &settlement.scope.id).await?;
        scope.constitution.entry(*target).or_default().push(provision.id.clone());

        state.update_record(&provision.id, &provision)?;
        state.update_record(&scope.id, &scope)?;

        info!("Amended {} provision of scope {} to {}", target, scope.id, provision.id);
        Ok(vec![action("provision-amended", &provision.id, block)])
    }
}
