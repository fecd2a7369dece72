//! Persistence layer.
//!
//! Defines the `PersistenceGateway` trait used by the submission
//! controller, with implementations for SQLite and the hosted Supabase
//! REST tables. The in-memory session itself is saved to and loaded
//! from a JSON file so a restart resumes the same roster.

pub mod sqlite;
pub mod supabase;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::submission::SessionSnapshot;
use crate::types::{ScoredSubmission, Selection, Submission};

/// Failure of a durable storage call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Schema mismatch: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Partial write: expected {expected} selections, stored {stored}")]
    PartialWrite { expected: usize, stored: usize },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Durable storage of submitted rosters.
///
/// `save_submission` must be all-or-nothing: the parent record and one
/// child per selection (with its roster position) are stored together,
/// or the call fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Store a roster against a contest for `owner`.
    async fn save_submission(
        &self,
        roster: &[Selection],
        contest_id: u64,
        owner: &str,
    ) -> Result<Submission, PersistenceError>;

    /// All submissions for a contest, with their settled scores.
    async fn list_submissions(
        &self,
        contest_id: u64,
    ) -> Result<Vec<ScoredSubmission>, PersistenceError>;

    /// Every submission made by `owner`, newest first.
    async fn list_submissions_by_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<ScoredSubmission>, PersistenceError>;

    /// Attach a settled score to a submission.
    async fn record_score(&self, submission_id: Uuid, score: Decimal)
        -> Result<(), PersistenceError>;
}

// ---------------------------------------------------------------------------
// Session snapshot file
// ---------------------------------------------------------------------------

/// Default session file path.
const DEFAULT_SESSION_FILE: &str = "leagues_session.json";

/// Save the session snapshot to a JSON file.
pub fn save_session(snapshot: &SessionSnapshot, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SESSION_FILE);
    let json = serde_json::to_string_pretty(snapshot)
        .context("Failed to serialise session snapshot")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write session to {path}"))?;

    debug!(path, selections = snapshot.selections.len(), "Session saved");
    Ok(())
}

/// Load the session snapshot from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_session(path: Option<&str>) -> Result<Option<SessionSnapshot>> {
    let path = path.unwrap_or(DEFAULT_SESSION_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved session found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read session from {path}"))?;

    let snapshot: SessionSnapshot = serde_json::from_str(&json)
        .context(format!("Failed to parse session from {path}"))?;

    info!(
        path,
        selections = snapshot.selections.len(),
        submitted = snapshot.is_submitted,
        "Session loaded from disk"
    );

    Ok(Some(snapshot))
}

/// Delete the session file.
pub fn delete_session(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SESSION_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete session file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
