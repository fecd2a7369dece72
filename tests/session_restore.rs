//! Session survives a restart through the JSON state file.

mod common;

use std::sync::Arc;

use common::{coins, contest, FakeGateway};
use leagues::catalog::{AssetCatalog, AssetClass, SnapshotCatalog};
use leagues::engine::roster::ToggleOutcome;
use leagues::engine::submission::{SubmissionController, SubmissionPhase, SubmissionPolicy};
use leagues::storage::{delete_session, load_session, save_session};
use leagues::types::{AssetRef, ContestState, Prediction, Stock};

fn temp_file() -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("leagues_it_session_{}.json", uuid::Uuid::new_v4()));
    p.to_string_lossy().to_string()
}

#[tokio::test]
async fn test_submitted_session_restores_locked() {
    let path = temp_file();
    let gw = FakeGateway::new();
    let ctrl = SubmissionController::new(gw.clone(), "0xowner", SubmissionPolicy::default());
    for asset in coins().iter().take(5) {
        ctrl.toggle_selection(asset, Prediction::Up);
    }
    let submission = ctrl.submit(&contest(1, ContestState::Active)).await.unwrap();
    save_session(&ctrl.snapshot(), Some(&path)).unwrap();

    let snapshot = load_session(Some(&path)).unwrap().unwrap();
    let restored = SubmissionController::restore(
        gw.clone(),
        "0xowner",
        SubmissionPolicy::default(),
        snapshot,
    );
    assert_eq!(restored.phase(), SubmissionPhase::Submitted);
    assert_eq!(restored.snapshot().last_submission, Some(submission));
    assert_eq!(
        restored.toggle_selection(&coins()[0], Prediction::Down),
        ToggleOutcome::Locked
    );

    delete_session(Some(&path)).unwrap();
    assert!(load_session(Some(&path)).unwrap().is_none());
}

#[test]
fn test_catalog_refresh_does_not_evict_roster() {
    let catalog = SnapshotCatalog::new();
    catalog.replace(
        AssetClass::Equity,
        vec![AssetRef::Equity(Stock {
            symbol: "AAPL".into(),
            name: "Apple Inc.".into(),
            price: 230.1,
            changes_percentage: 0.4,
        })],
    );

    let gw = FakeGateway::new();
    let ctrl = Arc::new(SubmissionController::new(gw, "0xowner", SubmissionPolicy::default()));
    let apple = catalog.find("equity:AAPL").unwrap();
    assert_eq!(ctrl.toggle_selection(&apple, Prediction::Up), ToggleOutcome::Added);

    catalog.replace(AssetClass::Equity, Vec::new());
    assert!(catalog.find("equity:AAPL").is_none());
    assert!(ctrl.is_in_roster(&apple));
    assert_eq!(ctrl.selections()[0].asset.name, "Apple Inc.");
}
