//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiContext>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{AssetCatalog, ContestCatalog};
use crate::engine::leaderboard::{self, ContestLeaderboard};
use crate::engine::roster::ToggleOutcome;
use crate::engine::submission::{SessionSnapshot, SubmissionController, SubmissionError};
use crate::storage::{PersistenceError, PersistenceGateway};
use crate::types::{Asset, Contest, ContestState, LeagueError, Prediction, Submission};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a handler can reach.
pub struct ApiContext {
    pub assets: Arc<dyn AssetCatalog>,
    pub contests: Arc<dyn ContestCatalog>,
    pub controller: Arc<SubmissionController>,
    pub gateway: Arc<dyn PersistenceGateway>,
}

pub type ApiState = Arc<ApiContext>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler error with its HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Lookup(#[from] LeagueError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Storage unavailable: {0}")]
    Storage(#[from] PersistenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Recover the typed cause from engine errors that travel as `anyhow`.
impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        let e = match e.downcast::<LeagueError>() {
            Ok(lookup) => return ApiError::Lookup(lookup),
            Err(e) => e,
        };
        match e.downcast::<PersistenceError>() {
            Ok(storage) => ApiError::Storage(storage),
            Err(e) => ApiError::Internal(format!("{e:#}")),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Lookup(LeagueError::UnknownAsset(_) | LeagueError::UnknownContest(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Lookup(LeagueError::ContestNotFinished { .. }) => StatusCode::CONFLICT,
            ApiError::Submission(SubmissionError::EmptyRoster)
            | ApiError::Submission(SubmissionError::IncompleteRoster { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Submission(SubmissionError::InvalidContestState { .. })
            | ApiError::Submission(SubmissionError::DuplicateSubmission) => StatusCode::CONFLICT,
            ApiError::Submission(SubmissionError::Persistence(PersistenceError::Timeout(_)))
            | ApiError::Storage(PersistenceError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Submission(SubmissionError::Persistence(_)) | ApiError::Storage(_) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub asset_id: String,
    pub prediction: Prediction,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub contest_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterChange {
    pub outcome: ToggleOutcome,
    /// False for `Ignored` and `Locked`: the roster is as it was.
    pub changed: bool,
    pub session: SessionSnapshot,
}

impl RosterChange {
    fn new(outcome: ToggleOutcome, session: SessionSnapshot) -> Self {
        Self {
            outcome,
            changed: outcome.changed(),
            session,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
    pub session: SessionSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettleResponse {
    pub contest_id: u64,
    pub scored: usize,
    pub leaderboard: ContestLeaderboard,
}

/// One of the session owner's past submissions.
#[derive(Debug, Clone, Serialize)]
pub struct TeamView {
    #[serde(flatten)]
    pub submission: Submission,
    pub score: Decimal,
    /// None when the contest is no longer in the catalog.
    pub contest_name: Option<String>,
    pub contest_state: Option<ContestState>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/assets?q=
pub async fn get_assets(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<Asset>> {
    Json(state.assets.search(&query.q))
}

/// GET /api/contests
pub async fn get_contests(State(state): State<ApiState>) -> Json<Vec<Contest>> {
    Json(state.contests.current_contests())
}

/// GET /api/contests/eligible
pub async fn get_eligible_contests(State(state): State<ApiState>) -> Json<Vec<Contest>> {
    let all = state.contests.current_contests();
    Json(SubmissionController::list_eligible_contests(&all))
}

/// GET /api/roster
pub async fn get_roster(State(state): State<ApiState>) -> Json<SessionSnapshot> {
    Json(state.controller.snapshot())
}

/// POST /api/roster/toggle
///
/// The asset is looked up in the catalog first, then in the roster so a
/// selection whose asset dropped out of the latest snapshot can still be
/// flipped or removed.
pub async fn toggle_selection(
    State(state): State<ApiState>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<RosterChange> {
    let asset = state
        .assets
        .find(&req.asset_id)
        .or_else(|| {
            state
                .controller
                .selections()
                .into_iter()
                .find(|s| s.asset.id == req.asset_id)
                .map(|s| s.asset)
        })
        .ok_or_else(|| LeagueError::UnknownAsset(req.asset_id.clone()))?;

    let outcome = state.controller.toggle_selection(&asset, req.prediction);
    debug!(asset_id = %asset.id, prediction = %req.prediction, ?outcome, "Toggle via API");
    Ok(Json(RosterChange::new(outcome, state.controller.snapshot())))
}

/// DELETE /api/roster/:asset_id
pub async fn remove_asset(
    State(state): State<ApiState>,
    Path(asset_id): Path<String>,
) -> Json<RosterChange> {
    let outcome = state.controller.remove_asset(&asset_id);
    Json(RosterChange::new(outcome, state.controller.snapshot()))
}

/// DELETE /api/roster
pub async fn clear_roster(State(state): State<ApiState>) -> Json<ClearResponse> {
    let cleared = state.controller.clear();
    Json(ClearResponse {
        cleared,
        session: state.controller.snapshot(),
    })
}

/// POST /api/submit
pub async fn submit(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let contest = state
        .contests
        .find(req.contest_id)
        .ok_or(LeagueError::UnknownContest(req.contest_id))?;

    let submission = state.controller.submit(&contest).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

/// POST /api/submission/reset
pub async fn reset_submission(State(state): State<ApiState>) -> Json<SessionSnapshot> {
    state.controller.reset_submission();
    Json(state.controller.snapshot())
}

/// GET /api/contests/:id/leaderboard
pub async fn get_leaderboard(
    State(state): State<ApiState>,
    Path(contest_id): Path<u64>,
) -> ApiResult<ContestLeaderboard> {
    let contest = state
        .contests
        .find(contest_id)
        .ok_or(LeagueError::UnknownContest(contest_id))?;

    let entries = state.gateway.list_submissions(contest_id).await?;
    Ok(Json(leaderboard::project(&contest, &entries)?))
}

/// POST /api/contests/:id/settle
///
/// Scores every submission against the catalog's latest moves, then
/// returns the resulting standings.
pub async fn settle_contest(
    State(state): State<ApiState>,
    Path(contest_id): Path<u64>,
) -> ApiResult<SettleResponse> {
    let contest = state
        .contests
        .find(contest_id)
        .ok_or(LeagueError::UnknownContest(contest_id))?;

    let moves = state.assets.price_moves();
    let scored = leaderboard::settle_contest(&*state.gateway, &contest, &moves).await?;
    info!(contest_id, scored, priced_assets = moves.len(), "Contest settled via API");

    let entries = state.gateway.list_submissions(contest_id).await?;
    Ok(Json(SettleResponse {
        contest_id,
        scored,
        leaderboard: leaderboard::project(&contest, &entries)?,
    }))
}

/// GET /api/teams
///
/// Submissions made by the session owner, newest first.
pub async fn get_my_teams(State(state): State<ApiState>) -> ApiResult<Vec<TeamView>> {
    let entries = state
        .gateway
        .list_submissions_by_owner(state.controller.owner())
        .await?;
    let contests = state.contests.current_contests();

    let teams = entries
        .into_iter()
        .map(|e| {
            let contest = contests.iter().find(|c| c.id == e.submission.contest_id);
            TeamView {
                contest_name: contest.map(|c| c.name.clone()),
                contest_state: contest.map(|c| c.state),
                submission: e.submission,
                score: e.score,
            }
        })
        .collect();
    Ok(Json(teams))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
