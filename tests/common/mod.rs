//! Shared fixtures for integration tests.
//!
//! `FakeGateway` is a deterministic in-memory `PersistenceGateway`:
//! failures can be forced, writes can be truncated, and calls can be
//! held open to keep a submission in flight.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

use leagues::storage::{PersistenceError, PersistenceGateway};
use leagues::types::*;

/// In-memory submission store with controllable failure modes.
#[derive(Default)]
pub struct FakeGateway {
    stored: Mutex<Vec<ScoredSubmission>>,
    calls: AtomicUsize,
    /// If set, every call returns this error.
    force_error: Mutex<Option<PersistenceError>>,
    /// If set, only this many selections are kept.
    truncate_to: Mutex<Option<usize>>,
    hold: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_error(&self, err: PersistenceError) {
        *self.force_error.lock().unwrap() = Some(err);
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn truncate_writes(&self, keep: usize) {
        *self.truncate_to.lock().unwrap() = Some(keep);
    }

    /// Hold `save_submission` open until `release` is called.
    pub fn hold_calls(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    /// Wait until a held call has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Vec<ScoredSubmission> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceGateway for FakeGateway {
    async fn save_submission(
        &self,
        roster: &[Selection],
        contest_id: u64,
        owner: &str,
    ) -> Result<Submission, PersistenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hold.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        let forced = self.force_error.lock().unwrap().clone();
        if let Some(err) = forced {
            return Err(err);
        }

        let mut submission = Submission::new(owner, contest_id, roster);
        let keep = *self.truncate_to.lock().unwrap();
        if let Some(keep) = keep {
            submission.roster_snapshot.truncate(keep);
        }

        self.stored.lock().unwrap().push(ScoredSubmission {
            submission: submission.clone(),
            score: Decimal::ZERO,
        });
        Ok(submission)
    }

    async fn list_submissions(
        &self,
        contest_id: u64,
    ) -> Result<Vec<ScoredSubmission>, PersistenceError> {
        let forced = self.force_error.lock().unwrap().clone();
        if let Some(err) = forced {
            return Err(err);
        }
        Ok(self
            .stored()
            .into_iter()
            .filter(|s| s.submission.contest_id == contest_id)
            .collect())
    }

    async fn list_submissions_by_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<ScoredSubmission>, PersistenceError> {
        let forced = self.force_error.lock().unwrap().clone();
        if let Some(err) = forced {
            return Err(err);
        }
        let mut mine: Vec<ScoredSubmission> = self
            .stored()
            .into_iter()
            .filter(|s| s.submission.owner == owner)
            .collect();
        mine.reverse();
        Ok(mine)
    }

    async fn record_score(&self, submission_id: Uuid, score: Decimal) -> Result<(), PersistenceError> {
        let mut stored = self.stored.lock().unwrap();
        match stored.iter_mut().find(|s| s.submission.id == submission_id) {
            Some(entry) => {
                entry.score = score;
                Ok(())
            }
            None => Err(PersistenceError::Schema(format!("no submission {submission_id}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn asset(id: &str, symbol: &str, name: &str) -> Asset {
    Asset {
        id: id.to_string(),
        symbol: symbol.to_string(),
        name: name.to_string(),
        image: None,
    }
}

/// Six coins; the first five make a full roster.
pub fn coins() -> Vec<Asset> {
    vec![
        asset("bitcoin", "btc", "Bitcoin"),
        asset("ethereum", "eth", "Ethereum"),
        asset("solana", "sol", "Solana"),
        asset("cardano", "ada", "Cardano"),
        asset("ripple", "xrp", "XRP"),
        asset("dogecoin", "doge", "Dogecoin"),
    ]
}

pub fn contest(id: u64, state: ContestState) -> Contest {
    Contest {
        id,
        name: format!("Contest {id}"),
        sport: "Crypto".to_string(),
        entry_fee: Decimal::new(5, 0),
        prize_pool: Decimal::new(1000, 0),
        start_time: Utc::now() - Duration::hours(1),
        end_time: Utc::now() + Duration::days(7),
        max_participants: 100,
        current_participants: 0,
        state,
    }
}
