//! Settlement of decided proposals
//!
//! The [`ActionPipeline`] is a fixed table from proposal type to the single
//! [`ActionHandler`] settling proposals of that type. It is built once at
//! startup and consulted by the scheduler for every decided proposal.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, info, warn};

use auton_core::{BlockContext, LedgerState};

use crate::model::{ActionRecord, Proposal, ProposalType, Provision, Scope, VoteResult};
use crate::{GovernanceConfig, GovernanceError, GovernanceResult};

pub mod handlers;

pub use handlers::{AddMemberHandler, AmendProvisionHandler, NewScopeHandler};

/// Everything a handler gets to see about a decision
#[derive(Debug, Clone, Copy)]
pub struct Settlement<'a> {
    pub result: VoteResult,
    pub proposal_id: &'a str,
    pub proposal: &'a Proposal,
    pub provision: &'a Provision,
    pub scope: &'a Scope,
}

/// Settles decided proposals of one type
///
/// Handlers are invoked for both accepted and rejected proposals and decide
/// for themselves whether to act. They must re-check their preconditions
/// against the current state; the pipeline only guarantees one invocation
/// per decision.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The proposal type this handler settles
    fn proposal_type(&self) -> ProposalType;

    /// Apply the side effects of a decision and report what was done
    async fn process(
        &self,
        settlement: &Settlement<'_>,
        state: &mut LedgerState,
        block: &mut BlockContext,
    ) -> GovernanceResult<Vec<ActionRecord>>;
}

/// What happened when a settlement was dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No handler is registered for the proposal type
    NoHandler,
    /// The handler succeeded
    Completed(Vec<ActionRecord>),
    /// The handler failed or panicked; its writes were rolled back
    Failed(String),
}

/// Builder for an [`ActionPipeline`]
#[derive(Default)]
pub struct ActionPipelineBuilder {
    handlers: BTreeMap<ProposalType, Arc<dyn ActionHandler>>,
}

impl ActionPipelineBuilder {
    /// Register a handler; a second handler for the same type is an error
    pub fn register(mut self, handler: Arc<dyn ActionHandler>) -> GovernanceResult<Self> {
        let proposal_type = handler.proposal_type();
        if self.handlers.contains_key(&proposal_type) {
            return Err(GovernanceError::DuplicateHandler(proposal_type));
        }
        self.handlers.insert(proposal_type, handler);
        Ok(self)
    }

    /// Finish the table
    pub fn build(self) -> ActionPipeline {
        ActionPipeline {
            handlers: self.handlers,
        }
    }
}

/// Type-keyed registry of settlement handlers
#[derive(Default)]
pub struct ActionPipeline {
    handlers: BTreeMap<ProposalType, Arc<dyn ActionHandler>>,
}

impl ActionPipeline {
    /// Start an empty builder
    pub fn builder() -> ActionPipelineBuilder {
        ActionPipelineBuilder::default()
    }

    /// The built-in handlers for scope creation, invitations and amendments
    pub fn with_builtin_handlers(config: &GovernanceConfig) -> Self {
        let handlers: [Arc<dyn ActionHandler>; 3] = [
            Arc::new(NewScopeHandler::new(config.founding_provision)),
            Arc::new(AddMemberHandler::new(config.invitation_window)),
            Arc::new(AmendProvisionHandler),
        ];

        Self {
            handlers: handlers
                .into_iter()
                .map(|handler| (handler.proposal_type(), handler))
                .collect(),
        }
    }

    /// Proposal types with a registered handler
    pub fn registered_types(&self) -> Vec<ProposalType> {
        self.handlers.keys().copied().collect()
    }

    /// Invoke the handler for the settled proposal's type
    ///
    /// Errors and panics raised by the handler are caught and logged, and
    /// the handler's partial writes are rolled back. They never reach the
    /// caller.
    pub async fn dispatch(
        &self,
        settlement: &Settlement<'_>,
        state: &mut LedgerState,
        block: &mut BlockContext,
    ) -> DispatchOutcome {
        let proposal_type = settlement.proposal.proposal_type;
        let Some(handler) = self.handlers.get(&proposal_type) else {
            debug!(
                "No settlement handler for {} proposal {}",
                proposal_type, settlement.proposal_id
            );
            return DispatchOutcome::NoHandler;
        };

        let checkpoint = state.checkpoint();
        let outcome = AssertUnwindSafe(handler.process(settlement, state, block))
            .catch_unwind()
            .await;

        let reason = match outcome {
            Ok(Ok(actions)) => {
                info!(
                    "Settled {} proposal {} as {:?} with {} actions",
                    proposal_type, settlement.proposal_id, settlement.result, actions.len()
                );
                return DispatchOutcome::Completed(actions);
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        state.rollback(checkpoint);
        let failure = GovernanceError::HandlerFailure { proposal_type, reason };
        warn!("Settlement of proposal {} failed: {}", settlement.proposal_id, failure);
        DispatchOutcome::Failed(failure.to_string())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
