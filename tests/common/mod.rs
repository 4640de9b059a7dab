#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use async_trait::async_trait;

use auton::core::{
    BlockContext, BlockHeader, EngineConfig, Event, EventChannel, LedgerState, MemoryStorage,
    Record, TxEnvelope,
};
use auton::governance::{
    cast_vote, establish_scope, submit_proposal, ActionHandler, ActionPipeline, ActionRecord,
    GovernanceConfig, GovernanceResult, Proposal, ProposalArgs, ProposalScheduler, ProposalType,
    ProvisionParams, Scope, ScopeGenesis, Settlement, SubmitProposal, VoteAnswer, VoteResult,
};
use auton::AutonNode;
use serde::{Deserialize, Serialize};

/// Keeps every published event
#[derive(Default)]
pub struct RecordingChannel {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingChannel {
    pub fn topics(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.topic.clone()).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.payload["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

impl EventChannel for RecordingChannel {
    fn publish(&self, topic: &str, payload: serde_json::Value) {
        self.events.lock().unwrap().push(Event {
            topic: topic.to_string(),
            payload,
        });
    }
}

/// Written by [`RecordingHandler`] so rollbacks can be observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementMark {
    pub proposal_id: String,
}

impl Record for SettlementMark {
    const TABLE: &'static str = "marks";
}

/// Generic-proposal handler that records every call
///
/// Titles starting with `fail` make it write a mark and then error, titles
/// starting with `panic` make it write a mark and then panic.
#[derive(Default)]
pub struct RecordingHandler {
    pub calls: Mutex<Vec<(String, VoteResult)>>,
}

impl RecordingHandler {
    pub fn calls(&self) -> Vec<(String, VoteResult)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionHandler for RecordingHandler {
    fn proposal_type(&self) -> ProposalType {
        ProposalType::Generic
    }

    async fn process(
        &self,
        settlement: &Settlement<'_>,
        state: &mut LedgerState,
        block: &mut BlockContext,
    ) -> GovernanceResult<Vec<ActionRecord>> {
        self.calls
            .lock()
            .unwrap()
            .push((settlement.proposal_id.to_string(), settlement.result));

        let mark = SettlementMark { proposal_id: settlement.proposal_id.to_string() };
        state.update_record(settlement.proposal_id, &mark)?;

        let title = settlement.proposal.title.as_str();
        if title.starts_with("fail") {
            return Err(anyhow::anyhow!("refusing {}", title).into());
        }
        if title.starts_with("panic") {
            panic!("handler blew up on {}", title);
        }

        Ok(vec![ActionRecord {
            kind: "recorded".to_string(),
            target_id: settlement.proposal_id.to_string(),
            height: block.height(),
            timestamp: block.now(),
        }])
    }
}

/// One hour voting window, no campaigning, 51/51 thresholds
pub fn hour_long() -> ProvisionParams {
    ProvisionParams {
        attendance: 51,
        acceptance: 51,
        campaigning: 0,
        voting_window: 60,
        exec_after_end: false,
    }
}

pub fn tx(sender: &str, nonce: u64) -> TxEnvelope {
    TxEnvelope::new(format!("{}-{}", sender, nonce), sender, nonce)
}

pub struct Harness {
    pub node: AutonNode,
    pub handler: Arc<RecordingHandler>,
    pub events: Arc<RecordingChannel>,
    pub height: u64,
    pub nonce: u64,
}

impl Harness {
    /// Node whose Generic proposals settle through a [`RecordingHandler`]
    pub fn recording() -> Self {
        let handler = Arc::new(RecordingHandler::default());
        let events = Arc::new(RecordingChannel::default());
        let pipeline = ActionPipeline::builder()
            .register(handler.clone())
            .unwrap()
            .build();
        let scheduler = ProposalScheduler::new(pipeline, GovernanceConfig::default())
            .with_events(events.clone());

        Self {
            node: AutonNode::new(Arc::new(MemoryStorage::new()), scheduler),
            handler,
            events,
            height: 0,
            nonce: 0,
        }
    }

    /// Node assembled from configuration with the built-in handlers
    pub fn builtin() -> Self {
        let node = AutonNode::from_config(&EngineConfig::default(), Arc::new(MemoryStorage::new()))
            .unwrap();
        Self {
            node,
            handler: Arc::new(RecordingHandler::default()),
            events: Arc::new(RecordingChannel::default()),
            height: 0,
            nonce: 0,
        }
    }

    pub fn next_tx(&mut self, sender: &str) -> TxEnvelope {
        self.nonce += 1;
        tx(sender, self.nonce)
    }

    /// Commit an empty block at `timestamp`
    pub async fn tick(&mut self, timestamp: u64) -> auton::governance::PassReport {
        self.height += 1;
        let session = self.node.begin_block(BlockHeader::new(self.height, timestamp)).unwrap();
        self.node.commit_block(session).await.unwrap()
    }

    /// Found a scope whose members are `account-0..account-{members}`
    pub async fn found(
        &mut self,
        timestamp: u64,
        members: usize,
        params: ProvisionParams,
    ) -> Scope {
        let founders = (0..members).map(|i| format!("account-{}", i)).collect();
        let tx = self.next_tx("genesis");
        self.height += 1;
        let mut session = self.node.begin_block(BlockHeader::new(self.height, timestamp)).unwrap();
        let scope = establish_scope(
            &mut session.state,
            &mut session.block,
            &tx,
            ScopeGenesis::uniform(format!("scope-{}", self.height), founders, params),
        )
        .await
        .unwrap();
        self.node.commit_block(session).await.unwrap();
        scope
    }

    /// Submit proposals in one block at `timestamp`
    pub async fn submit(
        &mut self,
        timestamp: u64,
        scope: &Scope,
        proposals: Vec<(String, ProposalArgs)>,
    ) -> (Vec<Proposal>, auton::governance::PassReport) {
        self.height += 1;
        let mut session = self.node.begin_block(BlockHeader::new(self.height, timestamp)).unwrap();
        let mut submitted = Vec::new();
        for (title, args) in proposals {
            let tx = self.next_tx("account-0");
            let request = SubmitProposal {
                scope_id: scope.id.clone(),
                membership_id: scope.memberships[0].clone(),
                title,
                args,
            };
            submitted.push(
                submit_proposal(&mut session.state, &mut session.block, &tx, request)
                    .await
                    .unwrap(),
            );
        }
        let report = self.node.commit_block(session).await.unwrap();
        (submitted, report)
    }

    /// Cast `(proposal, member index, answer)` ballots in one block
    pub async fn vote(
        &mut self,
        timestamp: u64,
        scope: &Scope,
        ballots: &[(&str, usize, VoteAnswer)],
    ) -> auton::governance::PassReport {
        self.height += 1;
        let mut session = self.node.begin_block(BlockHeader::new(self.height, timestamp)).unwrap();
        for (proposal_id, member, answer) in ballots {
            let tx = self.next_tx(&format!("account-{}", member));
            cast_vote(
                &mut session.state,
                &mut session.block,
                &tx,
                proposal_id,
                &scope.memberships[*member],
                *answer,
            )
            .await
            .unwrap();
        }
        self.node.commit_block(session).await.unwrap()
    }

    pub async fn proposal(&self, id: &str) -> Proposal {
        self.node.view().get_record::<Proposal>(id).await.unwrap().unwrap()
    }

    pub async fn record<T: Record>(&self, id: &str) -> Option<T> {
        self.node.view().get_record::<T>(id).await.unwrap()
    }
}

pub fn generic(title: &str) -> (String, ProposalArgs) {
    (
        title.to_string(),
        ProposalArgs::Generic { body: format!("{} body", title) },
    )
}
