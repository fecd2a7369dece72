//! End-to-end submission flows against the in-memory fake gateway.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{coins, contest, FakeGateway};
use leagues::engine::roster::ToggleOutcome;
use leagues::engine::submission::{
    SubmissionController, SubmissionError, SubmissionPhase, SubmissionPolicy,
};
use leagues::storage::PersistenceError;
use leagues::types::{ContestState, Prediction};

const CALLS: [Prediction; 5] = [
    Prediction::Up,
    Prediction::Down,
    Prediction::Up,
    Prediction::Up,
    Prediction::Down,
];

fn controller(gw: &Arc<FakeGateway>, policy: SubmissionPolicy) -> Arc<SubmissionController> {
    Arc::new(SubmissionController::new(gw.clone(), "0xowner", policy))
}

fn fill(ctrl: &SubmissionController) {
    for (asset, call) in coins().iter().zip(CALLS) {
        assert_eq!(ctrl.toggle_selection(asset, call), ToggleOutcome::Added);
    }
}

#[tokio::test]
async fn test_full_round_submit_and_reset() {
    let gw = FakeGateway::new();
    let ctrl = controller(&gw, SubmissionPolicy::default());
    let doge = coins()[5].clone();

    fill(&ctrl);
    assert_eq!(ctrl.phase(), SubmissionPhase::ReadyToSubmit);
    assert_eq!(ctrl.toggle_selection(&doge, Prediction::Up), ToggleOutcome::Ignored);

    let submission = ctrl.submit(&contest(1, ContestState::Active)).await.unwrap();
    assert_eq!(ctrl.phase(), SubmissionPhase::Submitted);
    assert_eq!(submission.contest_id, 1);
    assert_eq!(submission.owner, "0xowner");
    assert_eq!(
        submission.asset_names(),
        vec!["Bitcoin", "Ethereum", "Solana", "Cardano", "XRP"]
    );
    assert_eq!(submission.roster_snapshot[1].prediction, Prediction::Down);

    let stored = gw.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].submission, submission);

    // Locked until reset.
    assert_eq!(ctrl.toggle_selection(&coins()[0], Prediction::Down), ToggleOutcome::Locked);
    assert!(!ctrl.clear());
    assert!(matches!(
        ctrl.submit(&contest(1, ContestState::Active)).await,
        Err(SubmissionError::DuplicateSubmission)
    ));
    assert_eq!(gw.calls(), 1);

    ctrl.reset_submission();
    assert!(!ctrl.is_submitted());
    assert_eq!(ctrl.selections().len(), 5);
    assert_eq!(ctrl.phase(), SubmissionPhase::ReadyToSubmit);
    assert_eq!(ctrl.toggle_selection(&coins()[0], Prediction::Up), ToggleOutcome::Removed);
}

#[tokio::test]
async fn test_second_submit_while_in_flight_is_rejected() {
    let gw = FakeGateway::new();
    gw.hold_calls(true);
    let ctrl = controller(&gw, SubmissionPolicy::default());
    fill(&ctrl);

    let pending = {
        let ctrl = ctrl.clone();
        tokio::spawn(async move { ctrl.submit(&contest(1, ContestState::Active)).await })
    };
    gw.wait_entered().await;

    assert!(ctrl.is_submitting());
    assert_eq!(ctrl.phase(), SubmissionPhase::Submitting);
    assert_eq!(
        ctrl.submit(&contest(1, ContestState::Active)).await.unwrap_err(),
        SubmissionError::DuplicateSubmission
    );
    assert_eq!(ctrl.toggle_selection(&coins()[0], Prediction::Down), ToggleOutcome::Locked);
    assert_eq!(ctrl.remove_asset("bitcoin"), ToggleOutcome::Locked);

    // Reset is ignored while the call is pending.
    ctrl.reset_submission();
    assert!(ctrl.is_submitting());

    gw.release();
    let submission = pending.await.unwrap().unwrap();
    assert_eq!(ctrl.phase(), SubmissionPhase::Submitted);
    assert_eq!(ctrl.snapshot().last_submission, Some(submission));
    assert_eq!(gw.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_submit_leaves_state_unchanged() {
    let gw = FakeGateway::new();
    gw.hold_calls(true);
    let ctrl = controller(&gw, SubmissionPolicy::default());
    fill(&ctrl);
    let before = ctrl.snapshot();

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        ctrl.submit(&contest(1, ContestState::Active)),
    )
    .await;
    assert!(outcome.is_err());

    assert_eq!(ctrl.snapshot(), before);
    assert!(!ctrl.is_submitting());
    assert!(gw.stored().is_empty());

    // A fresh attempt goes through once the gateway answers.
    gw.hold_calls(false);
    ctrl.submit(&contest(1, ContestState::Active)).await.unwrap();
    assert!(ctrl.is_submitted());
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let gw = FakeGateway::new();
    gw.hold_calls(true);
    let policy = SubmissionPolicy {
        timeout: Duration::from_millis(50),
        ..SubmissionPolicy::default()
    };
    let ctrl = controller(&gw, policy);
    fill(&ctrl);

    let err = ctrl.submit(&contest(1, ContestState::Active)).await.unwrap_err();
    assert_eq!(
        err,
        SubmissionError::Persistence(PersistenceError::Timeout(Duration::from_millis(50)))
    );
    assert_eq!(ctrl.phase(), SubmissionPhase::ReadyToSubmit);
    assert!(!ctrl.is_submitted());
}

#[tokio::test]
async fn test_gateway_failure_keeps_roster_for_retry() {
    let gw = FakeGateway::new();
    gw.set_error(PersistenceError::Network("connection reset".into()));
    let ctrl = controller(&gw, SubmissionPolicy::default());
    fill(&ctrl);

    let err = ctrl.submit(&contest(2, ContestState::Upcoming)).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Persistence(PersistenceError::Network(_))));
    assert_eq!(ctrl.selections().len(), 5);
    assert!(!ctrl.is_submitted());

    gw.clear_error();
    ctrl.submit(&contest(2, ContestState::Upcoming)).await.unwrap();
    assert!(ctrl.is_submitted());
    assert_eq!(gw.calls(), 2);
}

#[tokio::test]
async fn test_truncated_write_is_detected() {
    let gw = FakeGateway::new();
    gw.truncate_writes(4);
    let ctrl = controller(&gw, SubmissionPolicy::default());
    fill(&ctrl);

    let err = ctrl.submit(&contest(1, ContestState::Active)).await.unwrap_err();
    assert_eq!(
        err,
        SubmissionError::Persistence(PersistenceError::PartialWrite { expected: 5, stored: 4 })
    );
    assert_eq!(ctrl.phase(), SubmissionPhase::ReadyToSubmit);
}

#[tokio::test]
async fn test_local_rejections_skip_gateway() {
    let gw = FakeGateway::new();
    let ctrl = controller(&gw, SubmissionPolicy::default());

    assert_eq!(
        ctrl.submit(&contest(1, ContestState::Active)).await.unwrap_err(),
        SubmissionError::EmptyRoster
    );

    ctrl.toggle_selection(&coins()[0], Prediction::Up);
    assert_eq!(
        ctrl.submit(&contest(1, ContestState::Active)).await.unwrap_err(),
        SubmissionError::IncompleteRoster { have: 1, need: 5 }
    );

    ctrl.clear();
    fill(&ctrl);
    assert_eq!(
        ctrl.submit(&contest(3, ContestState::Finished)).await.unwrap_err(),
        SubmissionError::InvalidContestState { contest_id: 3, state: ContestState::Finished }
    );
    assert_eq!(gw.calls(), 0);
}

#[tokio::test]
async fn test_partial_roster_allowed_when_policy_relaxed() {
    let gw = FakeGateway::new();
    let policy = SubmissionPolicy {
        require_full_roster: false,
        ..SubmissionPolicy::default()
    };
    let ctrl = controller(&gw, policy);
    ctrl.toggle_selection(&coins()[2], Prediction::Down);

    let submission = ctrl.submit(&contest(1, ContestState::Active)).await.unwrap();
    assert_eq!(submission.roster_snapshot.len(), 1);
}
