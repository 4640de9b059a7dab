//! Governance module for Auton
//!
//! This crate drives proposals through their campaign/vote cycle. Once per
//! committed block the [`ProposalScheduler`] walks the due entries of the
//! [`ScheduleIndex`], tallies votes against the provision snapshot of each
//! proposal, and hands every decided proposal to exactly one settlement
//! handler through the [`ActionPipeline`].

use thiserror::Error;

use auton_core::{ConfigError, StorageError};

/// Error types for governance operations
#[derive(Error, Debug)]
pub enum GovernanceError {
    /// Error with the ledger state store
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    /// A referenced record is absent
    #[error("Missing {kind}: {id}")]
    MissingReference {
        kind: &'static str,
        id: String,
    },

    /// Invalid proposal
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    /// Invalid vote
    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    /// Invalid provision parameters
    #[error("Invalid provision: {0}")]
    InvalidProvision(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A handler is already registered for the proposal type
    #[error("Duplicate handler for proposal type {0}")]
    DuplicateHandler(ProposalType),

    /// A settlement handler failed
    #[error("Handler for {proposal_type} failed: {reason}")]
    HandlerFailure {
        proposal_type: ProposalType,
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GovernanceError {
    /// Shorthand for [`GovernanceError::MissingReference`]
    pub fn missing(kind: &'static str, id: impl Into<String>) -> Self {
        GovernanceError::MissingReference { kind, id: id.into() }
    }
}

/// Result type for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

pub mod config;
pub mod execution;
pub mod model;
pub mod proposals;
pub mod schedule;
pub mod scheduler;
pub mod voting;

// Re-exports
pub use config::GovernanceConfig;
pub use execution::{
    ActionHandler, ActionPipeline, ActionPipelineBuilder, DispatchOutcome, Settlement,
};
pub use model::{
    ActionRecord, BinaryVoteResult, Comment, Membership, Proposal, ProposalArgs,
    ProposalStatus, ProposalType, Provision, ProvisionParams, Scope, Vote, VoteAnswer,
    VoteResult,
};
pub use proposals::{
    accept_invitation, add_comment, cast_vote, establish_scope, submit_proposal, ScopeGenesis,
    SubmitProposal,
};
pub use schedule::{ScheduleEntry, ScheduleIndex};
pub use scheduler::{PassReport, ProposalScheduler, Transition};
pub use voting::VoteTally;
