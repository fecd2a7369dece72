//! Leaderboard: ranked read-only view over persisted submissions.
//!
//! Ranking: score descending, then earlier `submitted_at`, then
//! submission id so the order is total. Ranks are positions `1..=n`.

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::storage::PersistenceGateway;
use crate::types::{Contest, ContestState, LeagueError, Prediction, ScoredSubmission, Submission};

/// One ranked submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub submission_id: Uuid,
    pub submitter: String,
    pub score: Decimal,
    pub asset_names: Vec<String>,
}

/// Ranked standings for one finished contest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContestLeaderboard {
    pub contest_id: u64,
    pub contest_name: String,
    pub sport: String,
    pub rows: Vec<LeaderboardRow>,
}

impl ContestLeaderboard {
    pub fn winner(&self) -> Option<&LeaderboardRow> {
        self.rows.first()
    }
}

/// Rank the submissions that belong to `contest`.
///
/// Entries for other contests are ignored. Fails if the contest has not
/// finished yet.
pub fn project(
    contest: &Contest,
    entries: &[ScoredSubmission],
) -> Result<ContestLeaderboard, LeagueError> {
    if contest.state != ContestState::Finished {
        return Err(LeagueError::ContestNotFinished {
            contest_id: contest.id,
            state: contest.state,
        });
    }

    let mut ranked: Vec<&ScoredSubmission> = entries
        .iter()
        .filter(|e| e.submission.contest_id == contest.id)
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.submission.submitted_at.cmp(&b.submission.submitted_at))
            .then_with(|| a.submission.id.cmp(&b.submission.id))
    });

    let rows = ranked
        .into_iter()
        .enumerate()
        .map(|(i, e)| LeaderboardRow {
            rank: i + 1,
            submission_id: e.submission.id,
            submitter: e.submission.owner.clone(),
            score: e.score,
            asset_names: e.submission.asset_names(),
        })
        .collect::<Vec<_>>();

    debug!(contest_id = contest.id, rows = rows.len(), "Leaderboard projected");

    Ok(ContestLeaderboard {
        contest_id: contest.id,
        contest_name: contest.name.clone(),
        sport: contest.sport.clone(),
        rows,
    })
}

/// Score a roster against realised percentage moves keyed by asset id.
///
/// An Up call earns the move, a Down call earns its negation. Assets
/// with no recorded move contribute nothing.
pub fn score_submission(submission: &Submission, moves: &HashMap<String, Decimal>) -> Decimal {
    submission
        .roster_snapshot
        .iter()
        .map(|s| {
            let change = moves.get(&s.asset.id).copied().unwrap_or(Decimal::ZERO);
            match s.prediction {
                Prediction::Up => change,
                Prediction::Down => -change,
            }
        })
        .sum()
}

/// Score every submission of a finished contest and store the results.
/// Returns the number of submissions scored.
pub async fn settle_contest(
    gateway: &dyn PersistenceGateway,
    contest: &Contest,
    moves: &HashMap<String, Decimal>,
) -> Result<usize> {
    if contest.state != ContestState::Finished {
        return Err(LeagueError::ContestNotFinished {
            contest_id: contest.id,
            state: contest.state,
        }
        .into());
    }

    let entries = gateway.list_submissions(contest.id).await?;
    for entry in &entries {
        let score = score_submission(&entry.submission, moves);
        gateway.record_score(entry.submission.id, score).await?;
    }

    info!(contest_id = contest.id, scored = entries.len(), "Contest settled");
    Ok(entries.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
