//! Proposal lifecycle scheduler
//!
//! Invoked once per committed block, after the block's transactions have
//! been applied. The pass is strictly sequential: the due set is
//! snapshotted up front, each entry is advanced by at most one status
//! transition, and the Schedule Index is written back once at the end.

use std::sync::Arc;
use serde_json::json;
use tracing::{debug, info, warn};

use auton_core::{BlockContext, EventChannel, LedgerState, NullChannel};

use crate::execution::{ActionPipeline, DispatchOutcome, Settlement};
use crate::model::{BinaryVoteResult, Proposal, ProposalStatus, Provision, Scope, VoteResult};
use crate::schedule::{ScheduleEntry, ScheduleIndex};
use crate::voting;
use crate::{GovernanceConfig, GovernanceError, GovernanceResult};

/// A status change made during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub proposal_id: String,
    pub from: ProposalStatus,
    pub to: ProposalStatus,
}

/// Summary of one scheduler pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub height: u64,
    /// Number of due entries in the snapshot
    pub evaluated: usize,
    pub transitions: Vec<Transition>,
    /// Entries left for the next pass because a record was missing
    pub deferred: Vec<String>,
    pub dispatched: Vec<(String, DispatchOutcome)>,
    /// Entries removed from the Schedule Index
    pub pruned: Vec<String>,
}

/// What a single entry asks of the end of the pass
enum Step {
    Unchanged,
    /// Entry of an already ENDED proposal dropped from the index
    Pruned,
    Deferred(GovernanceError),
    Advanced {
        from: ProposalStatus,
        settle: Option<(Provision, Scope)>,
    },
}

/// Drives every scheduled proposal through its state machine
pub struct ProposalScheduler {
    pipeline: ActionPipeline,
    events: Arc<dyn EventChannel>,
    config: GovernanceConfig,
}

impl ProposalScheduler {
    /// Create a scheduler publishing nothing
    pub fn new(pipeline: ActionPipeline, config: GovernanceConfig) -> Self {
        Self {
            pipeline,
            events: Arc::new(NullChannel),
            config,
        }
    }

    /// Publish decision notifications to `events`
    pub fn with_events(mut self, events: Arc<dyn EventChannel>) -> Self {
        self.events = events;
        self
    }

    /// The settlement pipeline
    pub fn pipeline(&self) -> &ActionPipeline {
        &self.pipeline
    }

    /// Block-commit hook
    ///
    /// Only storage failures escape; missing records defer their entry to
    /// the next pass and handler failures are contained by the pipeline.
    pub async fn on_block_commit(
        &self,
        block: &mut BlockContext,
        state: &mut LedgerState,
    ) -> GovernanceResult<PassReport> {
        let now = block.now();
        let mut index = ScheduleIndex::load(state).await?;
        let due = index.due(now);

        let mut report = PassReport {
            height: block.height(),
            evaluated: due.len(),
            ..PassReport::default()
        };

        for entry in &due {
            let stored = state.get_record::<Proposal>(&entry.proposal_id).await?;
            let Some(mut proposal) = stored else {
                warn!("Deferring schedule entry for unknown proposal {}", entry.proposal_id);
                report.deferred.push(entry.proposal_id.clone());
                continue;
            };

            let was_settled = proposal.vote_result.result.is_settled();
            let step = match self.advance(entry, &mut proposal, &mut index, state, now).await {
                Ok(step) => step,
                Err(GovernanceError::StorageError(e)) => return Err(e.into()),
                Err(e) => Step::Deferred(e),
            };

            let settle = match step {
                Step::Unchanged => continue,
                Step::Pruned => {
                    debug!("Pruned stale entry of ended proposal {}", proposal.id);
                    report.pruned.push(proposal.id.clone());
                    continue;
                }
                Step::Deferred(reason) => {
                    warn!("Deferring proposal {}: {}", proposal.id, reason);
                    report.deferred.push(proposal.id.clone());
                    continue;
                }
                Step::Advanced { from, settle } => {
                    info!("Proposal {} moved {} -> {}", proposal.id, from, proposal.status);
                    report.transitions.push(Transition {
                        proposal_id: proposal.id.clone(),
                        from,
                        to: proposal.status,
                    });
                    if proposal.status == ProposalStatus::Ended {
                        report.pruned.push(proposal.id.clone());
                    }
                    settle
                }
            };

            state.update_record(&proposal.id, &proposal)?;

            if !was_settled && proposal.vote_result.result.is_settled() {
                self.publish_decided(&proposal);
            }

            if let Some((provision, scope)) = settle {
                let outcome = self.settle(&mut proposal, &provision, &scope, state, block).await?;
                report.dispatched.push((proposal.id.clone(), outcome));
            }
        }

        index.save(state)?;
        debug!(
            "Block {} pass: {} due, {} transitions, {} deferred, {} scheduled",
            report.height,
            report.evaluated,
            report.transitions.len(),
            report.deferred.len(),
            index.len()
        );
        Ok(report)
    }

    /// Apply at most one transition to `proposal`
    async fn advance(
        &self,
        entry: &ScheduleEntry,
        proposal: &mut Proposal,
        index: &mut ScheduleIndex,
        state: &LedgerState,
        now: u64,
    ) -> GovernanceResult<Step> {
        let from = proposal.status;
        debug!(
            "Evaluating proposal {} ({}) scheduled at {}",
            proposal.id, from, entry.scheduled_at
        );

        match from {
            ProposalStatus::Campaigning if now >= proposal.window_open => {
                proposal.status = ProposalStatus::Voting;
                // parked until a vote arrives or the window closes
                index.upsert(&proposal.id, proposal.window_closed);
                Ok(Step::Advanced { from, settle: None })
            }
            ProposalStatus::Voting | ProposalStatus::Decided if now >= proposal.window_closed => {
                proposal.status = ProposalStatus::Ended;
                index.remove(&proposal.id);
                Ok(Step::Advanced { from, settle: None })
            }
            ProposalStatus::Voting => {
                let scope_id = proposal.scope_id.as_str();
                let scope = state
                    .get_record::<Scope>(scope_id)
                    .await?
                    .ok_or_else(|| GovernanceError::missing("scope", scope_id))?;
                let provision_id = proposal.provision_id.as_str();
                let provision = state
                    .get_record::<Provision>(provision_id)
                    .await?
                    .ok_or_else(|| GovernanceError::missing("provision", provision_id))?;

                let params = &provision.params;
                let outcome = voting::tally_proposal(state, proposal, &scope, params, now).await?;
                debug!(
                    "Proposal {} tally: {}/{}/{} of {} active",
                    proposal.id,
                    outcome.tally.accept_count,
                    outcome.tally.refuse_count,
                    outcome.tally.total_votes,
                    outcome.total_active
                );

                index.upsert(&proposal.id, proposal.window_closed);
                if outcome.verdict == VoteResult::Undecided {
                    return Ok(Step::Unchanged);
                }

                proposal.status = ProposalStatus::Decided;
                proposal.vote_result = BinaryVoteResult {
                    result: outcome.verdict,
                    member_count: outcome.total_active,
                    accepted_count: outcome.tally.accept_count,
                    refused_count: outcome.tally.refuse_count,
                    decided: now,
                };
                Ok(Step::Advanced { from, settle: Some((provision, scope)) })
            }
            ProposalStatus::Ended => {
                // stale entry left behind by an earlier writer
                index.remove(&proposal.id);
                Ok(Step::Pruned)
            }
            ProposalStatus::Campaigning | ProposalStatus::Decided => Ok(Step::Unchanged),
        }
    }

    /// Hand a decided proposal to the pipeline and log its side effects
    async fn settle(
        &self,
        proposal: &mut Proposal,
        provision: &Provision,
        scope: &Scope,
        state: &mut LedgerState,
        block: &mut BlockContext,
    ) -> GovernanceResult<DispatchOutcome> {
        let settlement = Settlement {
            result: proposal.vote_result.result,
            proposal_id: &proposal.id,
            proposal,
            provision,
            scope,
        };
        let outcome = self.pipeline.dispatch(&settlement, state, block).await;

        if let DispatchOutcome::Completed(actions) = &outcome {
            if !actions.is_empty() {
                proposal.actions.extend(actions.iter().cloned());
                state.update_record(&proposal.id, proposal)?;
            }
        }
        Ok(outcome)
    }

    fn publish_decided(&self, proposal: &Proposal) {
        match serde_json::to_value(proposal) {
            Ok(value) => self.events.publish(
                &self.config.decided_topic,
                json!({ "id": proposal.id, "proposal": value }),
            ),
            Err(e) => debug!("Skipping decision notification for {}: {}", proposal.id, e),
        }
    }
}
