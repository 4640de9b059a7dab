mod common;

use auton::core::{BlockHeader, Record};
use auton::governance::{
    cast_vote, BinaryVoteResult, DispatchOutcome, GovernanceError, Proposal, ProposalStatus,
    ScheduleIndex, VoteAnswer, VoteResult,
};
use common::{generic, hour_long, Harness, SettlementMark};

#[tokio::test]
async fn test_accepted_proposal_end_to_end() {
    let mut h = Harness::recording();
    let scope = h.found(500, 10, hour_long()).await;

    let (submitted, report) = h.submit(1_000, &scope, vec![generic("Buy a tractor")]).await;
    let id = submitted[0].id.clone();
    assert_eq!((submitted[0].window_open, submitted[0].window_closed), (1_000, 4_600));
    assert_eq!(report.transitions.len(), 1);
    assert_eq!(report.transitions[0].to, ProposalStatus::Voting);

    let ballots: Vec<_> = (1..=6).map(|m| (id.as_str(), m, VoteAnswer::Accept)).collect();
    let report = h.vote(1_100, &scope, &ballots).await;

    let proposal = h.proposal(&id).await;
    assert_eq!(proposal.status, ProposalStatus::Decided);
    assert_eq!(
        proposal.vote_result,
        BinaryVoteResult {
            result: VoteResult::Accepted,
            member_count: 10,
            accepted_count: 6,
            refused_count: 0,
            decided: 1_100,
        }
    );
    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(h.handler.calls(), vec![(id.clone(), VoteResult::Accepted)]);
    assert_eq!(proposal.actions.len(), 1);

    let index = ScheduleIndex::load(&h.node.view()).await.unwrap();
    assert_eq!(index.get(&id).unwrap().scheduled_at, 4_600);

    let quiet = h.tick(2_000).await;
    assert_eq!(quiet.evaluated, 0);

    let report = h.tick(4_600).await;
    assert_eq!(report.pruned, vec![id.clone()]);
    assert!(report.dispatched.is_empty());
    assert_eq!(h.proposal(&id).await.status, ProposalStatus::Ended);
    assert_eq!(h.handler.calls().len(), 1);
    assert!(ScheduleIndex::load(&h.node.view()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_proposal_still_reaches_handler() {
    let mut h = Harness::recording();
    let scope = h.found(500, 10, hour_long()).await;
    let (submitted, _) = h.submit(1_000, &scope, vec![generic("Sell the barn")]).await;
    let id = submitted[0].id.as_str();

    // six ballots reach quorum, five refusals reach the 49% resistance line
    let mut ballots: Vec<_> = (1..=5).map(|m| (id, m, VoteAnswer::Refuse)).collect();
    ballots.push((id, 6, VoteAnswer::Abstain));
    h.vote(1_100, &scope, &ballots).await;

    let proposal = h.proposal(id).await;
    assert_eq!(proposal.status, ProposalStatus::Decided);
    assert_eq!(proposal.vote_result.result, VoteResult::Rejected);
    assert_eq!(proposal.vote_result.refused_count, 5);
    assert_eq!(h.handler.calls(), vec![(id.to_string(), VoteResult::Rejected)]);
}

#[tokio::test]
async fn test_stalled_proposal_ends_undecided() {
    let mut h = Harness::recording();
    let scope = h.found(500, 10, hour_long()).await;
    let (submitted, _) = h.submit(1_000, &scope, vec![generic("Repaint")]).await;
    let id = submitted[0].id.as_str();

    let ballots = [(id, 1, VoteAnswer::Accept), (id, 2, VoteAnswer::Accept)];
    let report = h.vote(1_100, &scope, &ballots).await;
    assert_eq!(report.evaluated, 1);
    assert!(report.transitions.is_empty());

    // parked at the window close until then
    let index = ScheduleIndex::load(&h.node.view()).await.unwrap();
    assert_eq!(index.get(id).unwrap().scheduled_at, 4_600);
    assert_eq!(h.tick(3_000).await.evaluated, 0);

    let report = h.tick(4_600).await;
    let proposal = h.proposal(id).await;
    assert_eq!(proposal.status, ProposalStatus::Ended);
    assert_eq!(proposal.vote_result.result, VoteResult::Undecided);
    assert_eq!(report.pruned, vec![id.to_string()]);
    assert!(h.handler.calls().is_empty());
}

#[tokio::test]
async fn test_campaigning_waits_for_window_open() {
    let mut h = Harness::recording();
    let mut params = hour_long();
    params.campaigning = 10;
    let scope = h.found(500, 3, params).await;

    let (submitted, report) = h.submit(1_000, &scope, vec![generic("Later")]).await;
    let id = submitted[0].id.as_str();
    assert_eq!(submitted[0].window_open, 1_600);
    assert_eq!(report.evaluated, 0);

    assert_eq!(h.tick(1_599).await.evaluated, 0);
    assert_eq!(h.proposal(id).await.status, ProposalStatus::Campaigning);

    let report = h.tick(1_600).await;
    assert_eq!(report.transitions[0].from, ProposalStatus::Campaigning);
    assert_eq!(h.proposal(id).await.status, ProposalStatus::Voting);
}

#[tokio::test]
async fn test_pass_is_idempotent() {
    let mut h = Harness::recording();
    let scope = h.found(500, 10, hour_long()).await;
    let (submitted, _) = h.submit(1_000, &scope, vec![generic("Twice")]).await;
    let id = submitted[0].id.clone();

    let mut session = h.node.begin_block(BlockHeader::new(10, 1_100)).unwrap();
    for member in 1..=6 {
        let tx = common::tx("voter", member as u64);
        cast_vote(
            &mut session.state,
            &mut session.block,
            &tx,
            &id,
            &scope.memberships[member],
            VoteAnswer::Accept,
        )
        .await
        .unwrap();
    }

    let scheduler = h.node.scheduler();
    let first = scheduler.on_block_commit(&mut session.block, &mut session.state).await.unwrap();
    let decided: Proposal = session.state.get_record(&id).await.unwrap().unwrap();
    let second = scheduler.on_block_commit(&mut session.block, &mut session.state).await.unwrap();
    let again: Proposal = session.state.get_record(&id).await.unwrap().unwrap();

    assert_eq!(first.transitions.len(), 1);
    assert!(second.transitions.is_empty());
    assert!(second.dispatched.is_empty());
    assert_eq!(decided, again);
    assert_eq!(h.handler.calls().len(), 1);
}

#[tokio::test]
async fn test_status_is_monotonic_and_votes_after_decision_are_refused() {
    let mut h = Harness::recording();
    let scope = h.found(500, 4, hour_long()).await;
    let (submitted, _) = h.submit(1_000, &scope, vec![generic("Monotonic")]).await;
    let id = submitted[0].id.clone();
    let mut seen = vec![h.proposal(&id).await.status];

    h.vote(1_100, &scope, &[(id.as_str(), 1, VoteAnswer::Accept)]).await;
    seen.push(h.proposal(&id).await.status);
    let ballots = [(id.as_str(), 2, VoteAnswer::Accept), (id.as_str(), 3, VoteAnswer::Accept)];
    h.vote(1_200, &scope, &ballots).await;
    seen.push(h.proposal(&id).await.status);

    let mut session = h.node.begin_block(BlockHeader::new(50, 1_300)).unwrap();
    let late = cast_vote(
        &mut session.state,
        &mut session.block,
        &common::tx("account-0", 99),
        &id,
        &scope.memberships[0],
        VoteAnswer::Refuse,
    )
    .await;
    assert!(matches!(late, Err(GovernanceError::InvalidVote(_))));
    h.node.abort_block(session);

    h.tick(4_600).await;
    seen.push(h.proposal(&id).await.status);

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(seen.last(), Some(&ProposalStatus::Ended));
    assert_eq!(h.proposal(&id).await.vote_result.accepted_count, 3);
}

#[tokio::test]
async fn test_handler_failures_are_isolated_within_a_pass() {
    let mut h = Harness::recording();
    let scope = h.found(500, 3, hour_long()).await;
    let (submitted, _) = h
        .submit(
            1_000,
            &scope,
            vec![generic("fail loudly"), generic("fine"), generic("panic quietly")],
        )
        .await;
    let ids: Vec<&str> = submitted.iter().map(|p| p.id.as_str()).collect();

    let mut ballots = Vec::new();
    for id in &ids {
        ballots.push((*id, 1, VoteAnswer::Accept));
        ballots.push((*id, 2, VoteAnswer::Accept));
    }
    let report = h.vote(1_100, &scope, &ballots).await;

    assert_eq!(report.transitions.len(), 3);
    assert_eq!(h.handler.calls().len(), 3);
    assert!(matches!(report.dispatched[0].1, DispatchOutcome::Failed(_)));
    assert!(matches!(report.dispatched[1].1, DispatchOutcome::Completed(_)));
    assert!(matches!(report.dispatched[2].1, DispatchOutcome::Failed(_)));

    for id in &ids {
        assert_eq!(h.proposal(id).await.status, ProposalStatus::Decided);
    }
    assert!(h.proposal(ids[0]).await.actions.is_empty());
    assert_eq!(h.proposal(ids[1]).await.actions.len(), 1);

    // partial writes of failed settlements were rolled back
    assert!(h.record::<SettlementMark>(ids[0]).await.is_none());
    assert!(h.record::<SettlementMark>(ids[1]).await.is_some());
    assert!(h.record::<SettlementMark>(ids[2]).await.is_none());
}

#[tokio::test]
async fn test_missing_references_defer_without_blocking_others() {
    let mut h = Harness::recording();
    let scope = h.found(500, 3, hour_long()).await;
    let (submitted, _) = h.submit(1_000, &scope, vec![generic("orphan"), generic("healthy")]).await;
    let orphan = submitted[0].id.clone();
    let healthy = submitted[1].id.clone();

    // break the orphan's provision reference and add an entry for a proposal that never existed
    let mut session = h.node.begin_block(BlockHeader::new(20, 1_050)).unwrap();
    let mut broken = h.proposal(&orphan).await;
    broken.provision_id = "gone".to_string();
    session.state.update_record(&orphan, &broken).unwrap();
    let mut index = ScheduleIndex::load(&session.state).await.unwrap();
    index.upsert(&orphan, 1_050);
    index.upsert("ghost", 1_050);
    index.save(&mut session.state).unwrap();
    h.node.commit_block(session).await.unwrap();
    h.height = 20;

    let healthy = healthy.as_str();
    let ballots = [(healthy, 1, VoteAnswer::Accept), (healthy, 2, VoteAnswer::Accept)];
    let report = h.vote(1_100, &scope, &ballots).await;
    assert!(report.deferred.contains(&orphan));
    assert!(report.deferred.contains(&"ghost".to_string()));
    assert_eq!(h.proposal(healthy).await.status, ProposalStatus::Decided);
    assert_eq!(h.proposal(&orphan).await.status, ProposalStatus::Voting);

    // retried on every pass until the record shows up
    let report = h.tick(1_200).await;
    assert_eq!(report.deferred.len(), 2);
    let index = ScheduleIndex::load(&h.node.view()).await.unwrap();
    assert!(index.get("ghost").is_some());
}

#[tokio::test]
async fn test_decision_notification_published_once() {
    let mut h = Harness::recording();
    let scope = h.found(500, 3, hour_long()).await;
    let (submitted, _) = h.submit(1_000, &scope, vec![generic("Announce")]).await;
    let id = submitted[0].id.as_str();

    h.vote(1_100, &scope, &[(id, 0, VoteAnswer::Accept), (id, 1, VoteAnswer::Accept)]).await;
    h.tick(4_600).await;

    assert_eq!(h.events.topics(), vec!["proposal:decided".to_string()]);
    assert_eq!(h.events.ids(), vec![id.to_string()]);
    let payload = h.events.events.lock().unwrap()[0].payload.clone();
    assert_eq!(payload["proposal"]["status"], serde_json::json!("Decided"));
}

#[tokio::test]
async fn test_ended_entry_left_behind_is_pruned() {
    let mut h = Harness::recording();
    let scope = h.found(500, 3, hour_long()).await;
    let (submitted, _) = h.submit(1_000, &scope, vec![generic("Done")]).await;
    let id = submitted[0].id.clone();
    h.tick(4_600).await;
    assert_eq!(h.proposal(&id).await.status, ProposalStatus::Ended);

    let mut session = h.node.begin_block(BlockHeader::new(30, 4_700)).unwrap();
    let mut index = ScheduleIndex::load(&session.state).await.unwrap();
    index.upsert(&id, 4_700);
    index.save(&mut session.state).unwrap();
    let report = h.node.commit_block(session).await.unwrap();

    assert_eq!(report.evaluated, 1);
    assert!(report.transitions.is_empty());
    assert_eq!(report.pruned, vec![id.clone()]);
    assert!(ScheduleIndex::load(&h.node.view()).await.unwrap().is_empty());
    assert_eq!(Proposal::key(&id), format!("proposals/{}", id));
}

#[tokio::test]
async fn test_proposals_ending_together_are_all_pruned() {
    let mut h = Harness::recording();
    let scope = h.found(500, 3, hour_long()).await;
    let titles = ["First", "Second", "Third", "Fourth"];
    let (submitted, _) = h
        .submit(1_000, &scope, titles.iter().map(|t| generic(t)).collect())
        .await;
    let mut ids: Vec<String> = submitted.iter().map(|p| p.id.clone()).collect();

    // one decided, the rest still voting when the shared window closes
    let decided = ids[1].as_str();
    h.vote(1_100, &scope, &[(decided, 0, VoteAnswer::Accept), (decided, 1, VoteAnswer::Accept)])
        .await;
    assert_eq!(h.proposal(decided).await.status, ProposalStatus::Decided);

    let report = h.tick(4_600).await;
    assert_eq!(report.evaluated, 4);
    assert_eq!(report.transitions.len(), 4);
    assert!(report.transitions.iter().all(|t| t.to == ProposalStatus::Ended));
    assert!(report.deferred.is_empty());

    let mut pruned = report.pruned.clone();
    pruned.sort();
    ids.sort();
    assert_eq!(pruned, ids);

    for id in &ids {
        assert_eq!(h.proposal(id).await.status, ProposalStatus::Ended);
    }
    assert!(ScheduleIndex::load(&h.node.view()).await.unwrap().is_empty());
}
