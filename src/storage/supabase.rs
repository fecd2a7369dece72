//! Supabase REST persistence gateway.
//!
//! Writes to the hosted `teams` / `team_tokens` tables through PostgREST.
//! The two inserts are separate HTTP calls, so a failed child insert is
//! compensated by deleting the parent row; if that also fails the
//! orphan is reported as `PartialWrite`. The pair runs on a spawned task
//! and is rolled back when the caller stops waiting. Reads skip team
//! rows without tokens.
//!
//! Auth: `apikey` header plus bearer token, both the project key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{PersistenceError, PersistenceGateway};
use crate::types::{Asset, Prediction, ScoredSubmission, Selection, Submission};

const TEAMS: &str = "teams";
const TEAM_TOKENS: &str = "team_tokens";
const DEFAULT_TEAM_NAME: &str = "My Team";

// ---------------------------------------------------------------------------
// Row types (PostgREST JSON ↔ Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TeamInsert<'a> {
    id: Uuid,
    wallet_address: &'a str,
    team_name: &'a str,
    contest_id: u64,
    submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct TeamTokenInsert<'a> {
    team_id: Uuid,
    position: usize,
    asset_id: &'a str,
    token_symbol: &'a str,
    token_name: &'a str,
    logo_url: Option<&'a str>,
    prediction: Prediction,
}

#[derive(Debug, Deserialize)]
struct TeamRow {
    id: Uuid,
    wallet_address: String,
    contest_id: u64,
    submitted_at: DateTime<Utc>,
    #[serde(default)]
    score: Option<Decimal>,
    #[serde(default)]
    team_tokens: Vec<TeamTokenRow>,
}

#[derive(Debug, Deserialize)]
struct TeamTokenRow {
    position: usize,
    asset_id: String,
    token_symbol: String,
    token_name: String,
    #[serde(default)]
    logo_url: Option<String>,
    prediction: Prediction,
}

impl TeamRow {
    fn into_scored(mut self) -> ScoredSubmission {
        self.team_tokens.sort_by_key(|t| t.position);
        let roster_snapshot = self
            .team_tokens
            .into_iter()
            .map(|t| Selection {
                asset: Asset {
                    id: t.asset_id,
                    symbol: t.token_symbol,
                    name: t.token_name,
                    image: t.logo_url,
                },
                prediction: t.prediction,
            })
            .collect();

        ScoredSubmission {
            submission: Submission {
                id: self.id,
                owner: self.wallet_address,
                contest_id: self.contest_id,
                roster_snapshot,
                submitted_at: self.submitted_at,
            },
            score: self.score.unwrap_or(Decimal::ZERO),
        }
    }
}

impl From<reqwest::Error> for PersistenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PersistenceError::Schema(e.to_string())
        } else {
            PersistenceError::Network(e.to_string())
        }
    }
}

/// Map a non-success HTTP status to the matching error kind.
fn status_error(status: StatusCode, body: String) -> PersistenceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PersistenceError::Auth(format!("{status}: {body}"))
        }
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::CONFLICT
        | StatusCode::UNPROCESSABLE_ENTITY => PersistenceError::Schema(format!("{status}: {body}")),
        _ => PersistenceError::Network(format!("{status}: {body}")),
    }
}

async fn ensure_success(resp: Response) -> Result<Response, PersistenceError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Supabase-backed submission store.
#[derive(Clone)]
pub struct SupabaseGateway {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl SupabaseGateway {
    pub fn new(base_url: &str, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("LEAGUES/0.1.0")
            .build()
            .context("Failed to build HTTP client for Supabase")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        req.header("apikey", key.as_str()).bearer_auth(key)
    }

    async fn delete_team(&self, team_id: Uuid) -> Result<(), PersistenceError> {
        let resp = self
            .authed(self.http.delete(self.table_url(TEAMS)))
            .query(&[("id", format!("eq.{team_id}"))])
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Insert the team row, then its tokens. A failed token insert
    /// removes the team row again.
    async fn insert_team(&self, submission: &Submission) -> Result<(), PersistenceError> {
        let team = TeamInsert {
            id: submission.id,
            wallet_address: &submission.owner,
            team_name: DEFAULT_TEAM_NAME,
            contest_id: submission.contest_id,
            submitted_at: submission.submitted_at,
        };
        let resp = self
            .authed(self.http.post(self.table_url(TEAMS)))
            .header("Prefer", "return=minimal")
            .json(&team)
            .send()
            .await?;
        ensure_success(resp).await?;
        debug!(team_id = %submission.id, contest_id = submission.contest_id, "Team row inserted");

        let tokens: Vec<TeamTokenInsert<'_>> = submission
            .roster_snapshot
            .iter()
            .enumerate()
            .map(|(position, s)| TeamTokenInsert {
                team_id: submission.id,
                position,
                asset_id: &s.asset.id,
                token_symbol: &s.asset.symbol,
                token_name: &s.asset.name,
                logo_url: s.asset.image.as_deref(),
                prediction: s.prediction,
            })
            .collect();

        let children = match self
            .authed(self.http.post(self.table_url(TEAM_TOKENS)))
            .header("Prefer", "return=minimal")
            .json(&tokens)
            .send()
            .await
        {
            Ok(resp) => ensure_success(resp).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        if let Err(child_err) = children {
            warn!(team_id = %submission.id, error = %child_err, "Token insert failed, removing team row");
            return match self.delete_team(submission.id).await {
                Ok(()) => Err(child_err),
                Err(cleanup_err) => {
                    error!(
                        team_id = %submission.id,
                        error = %cleanup_err,
                        "Orphaned team row left behind"
                    );
                    Err(PersistenceError::PartialWrite {
                        expected: submission.roster_snapshot.len(),
                        stored: 0,
                    })
                }
            };
        }
        Ok(())
    }

    async fn fetch_teams(&self, filter: &str, order: &str) -> Result<Vec<ScoredSubmission>, PersistenceError> {
        let url = format!(
            "{}?{filter}&select={}&order={order}",
            self.table_url(TEAMS),
            urlencoding::encode("*,team_tokens(*)"),
        );
        let resp = self.authed(self.http.get(&url)).send().await?;
        let rows: Vec<TeamRow> = ensure_success(resp).await?.json().await?;
        Ok(complete_teams(rows))
    }
}

/// Drop team rows that carry no tokens. They are leftovers of an
/// interrupted write, never a real roster.
fn complete_teams(rows: Vec<TeamRow>) -> Vec<ScoredSubmission> {
    rows.into_iter()
        .filter(|row| {
            if row.team_tokens.is_empty() {
                warn!(team_id = %row.id, "Skipping team row without tokens");
                return false;
            }
            true
        })
        .map(TeamRow::into_scored)
        .collect()
}

#[async_trait]
impl PersistenceGateway for SupabaseGateway {
    /// The two inserts run on their own task so that dropping this future
    /// (a caller timeout, a cancelled request) cannot stop between them.
    /// If nobody is waiting once the write lands, the team is deleted.
    async fn save_submission(
        &self,
        roster: &[Selection],
        contest_id: u64,
        owner: &str,
    ) -> Result<Submission, PersistenceError> {
        let submission = Submission::new(owner, contest_id, roster);
        let (tx, rx) = oneshot::channel();

        let gateway = self.clone();
        let pending = submission.clone();
        tokio::spawn(async move {
            let outcome = gateway.insert_team(&pending).await;
            let written = outcome.is_ok();
            if tx.send(outcome).is_err() && written {
                warn!(team_id = %pending.id, "Caller gone before write confirmed, removing team");
                if let Err(e) = gateway.delete_team(pending.id).await {
                    error!(team_id = %pending.id, error = %e, "Abandoned team row left behind");
                }
            }
        });

        match rx.await {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Err(PersistenceError::Network(
                    "team write task ended without a result".to_string(),
                ))
            }
        }
        Ok(submission)
    }

    async fn list_submissions(
        &self,
        contest_id: u64,
    ) -> Result<Vec<ScoredSubmission>, PersistenceError> {
        self.fetch_teams(&format!("contest_id=eq.{contest_id}"), "submitted_at.asc")
            .await
    }

    async fn list_submissions_by_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<ScoredSubmission>, PersistenceError> {
        let filter = format!("wallet_address=eq.{}", urlencoding::encode(owner));
        self.fetch_teams(&filter, "submitted_at.desc").await
    }

    async fn record_score(
        &self,
        submission_id: Uuid,
        score: Decimal,
    ) -> Result<(), PersistenceError> {
        let resp = self
            .authed(self.http.patch(self.table_url(TEAMS)))
            .query(&[("id", format!("eq.{submission_id}"))])
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "score": score }))
            .send()
            .await?;
        let updated: Vec<serde_json::Value> = ensure_success(resp).await?.json().await?;
        if updated.is_empty() {
            return Err(PersistenceError::Schema(format!(
                "no team with id {submission_id}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
