//! SQLite persistence gateway.
//!
//! A submission is one row in `submissions` plus one row per selection
//! in `submission_selections`, keyed by roster position. Both are
//! written inside a single transaction, so a failure part-way leaves
//! nothing behind.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{PersistenceError, PersistenceGateway};
use crate::types::{Asset, Prediction, ScoredSubmission, Selection, Submission};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS submissions (
        id            TEXT PRIMARY KEY,
        owner         TEXT NOT NULL,
        contest_id    INTEGER NOT NULL,
        submitted_at  TEXT NOT NULL,
        score         TEXT
    )",
    "CREATE TABLE IF NOT EXISTS submission_selections (
        submission_id TEXT NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
        position      INTEGER NOT NULL,
        asset_id      TEXT NOT NULL,
        symbol        TEXT NOT NULL,
        name          TEXT NOT NULL,
        image         TEXT,
        prediction    TEXT NOT NULL,
        PRIMARY KEY (submission_id, position),
        UNIQUE (submission_id, asset_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_submissions_contest ON submissions(contest_id)",
    "CREATE INDEX IF NOT EXISTS idx_submissions_owner ON submissions(owner)",
];

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        let msg = e.to_string();
        match e {
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::TypeNotFound { .. } => PersistenceError::Schema(msg),
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => PersistenceError::Network(msg),
            _ => PersistenceError::Database(msg),
        }
    }
}

/// Submission store backed by a local SQLite database.
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Open (creating if needed) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database: {url}"))?;

        let gateway = Self { pool };
        gateway.migrate().await?;
        info!(url, "SQLite submission store ready");
        Ok(gateway)
    }

    /// Private in-memory database. One pinned connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        let gateway = Self { pool };
        gateway.migrate().await?;
        Ok(gateway)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply SQLite schema")?;
        }
        Ok(())
    }

    async fn load_selections(&self, submission_id: &str) -> Result<Vec<Selection>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT asset_id, symbol, name, image, prediction
             FROM submission_selections
             WHERE submission_id = ?
             ORDER BY position",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(selection_from_row).collect()
    }

    /// Rebuild scored submissions from `submissions` rows, loading each roster.
    async fn scored_from_rows(&self, rows: Vec<SqliteRow>) -> Result<Vec<ScoredSubmission>, PersistenceError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let contest_id: i64 = row.try_get("contest_id")?;
            let submitted_at: String = row.try_get("submitted_at")?;
            let score: Option<String> = row.try_get("score")?;

            let submission = Submission {
                id: Uuid::parse_str(&id).map_err(|e| schema_err("submission id", e))?,
                owner: row.try_get("owner")?,
                contest_id: u64::try_from(contest_id).map_err(|e| schema_err("contest id", e))?,
                roster_snapshot: self.load_selections(&id).await?,
                submitted_at: DateTime::parse_from_rfc3339(&submitted_at)
                    .map_err(|e| schema_err("submitted_at", e))?
                    .with_timezone(&Utc),
            };
            let score = match score {
                Some(s) => Decimal::from_str(&s).map_err(|e| schema_err("score", e))?,
                None => Decimal::ZERO,
            };
            out.push(ScoredSubmission { submission, score });
        }
        Ok(out)
    }
}

fn selection_from_row(row: &SqliteRow) -> Result<Selection, PersistenceError> {
    let prediction: String = row.try_get("prediction")?;
    let prediction = Prediction::from_str(&prediction)
        .map_err(|e| PersistenceError::Schema(e.to_string()))?;

    Ok(Selection {
        asset: Asset {
            id: row.try_get("asset_id")?,
            symbol: row.try_get("symbol")?,
            name: row.try_get("name")?,
            image: row.try_get("image")?,
        },
        prediction,
    })
}

fn schema_err(field: &str, e: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Schema(format!("invalid {field}: {e}"))
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn save_submission(
        &self,
        roster: &[Selection],
        contest_id: u64,
        owner: &str,
    ) -> Result<Submission, PersistenceError> {
        let contest_key = i64::try_from(contest_id).map_err(|e| schema_err("contest id", e))?;
        let submission = Submission::new(owner, contest_id, roster);
        let id = submission.id.to_string();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO submissions (id, owner, contest_id, submitted_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(owner)
        .bind(contest_key)
        .bind(submission.submitted_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, selection) in roster.iter().enumerate() {
            sqlx::query(
                "INSERT INTO submission_selections
                 (submission_id, position, asset_id, symbol, name, image, prediction)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id.as_str())
            .bind(position as i64)
            .bind(selection.asset.id.as_str())
            .bind(selection.asset.symbol.as_str())
            .bind(selection.asset.name.as_str())
            .bind(selection.asset.image.as_deref())
            .bind(selection.prediction.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            submission_id = %submission.id,
            contest_id,
            selections = roster.len(),
            "Submission stored"
        );
        Ok(submission)
    }

    async fn list_submissions(
        &self,
        contest_id: u64,
    ) -> Result<Vec<ScoredSubmission>, PersistenceError> {
        let contest_key = i64::try_from(contest_id).map_err(|e| schema_err("contest id", e))?;
        let rows = sqlx::query(
            "SELECT id, owner, contest_id, submitted_at, score
             FROM submissions
             WHERE contest_id = ?
             ORDER BY submitted_at",
        )
        .bind(contest_key)
        .fetch_all(&self.pool)
        .await?;

        self.scored_from_rows(rows).await
    }

    async fn list_submissions_by_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<ScoredSubmission>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT id, owner, contest_id, submitted_at, score
             FROM submissions
             WHERE owner = ?
             ORDER BY submitted_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        debug!(owner, teams = rows.len(), "Owner submissions loaded");
        self.scored_from_rows(rows).await
    }

    async fn record_score(
        &self,
        submission_id: Uuid,
        score: Decimal,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query("UPDATE submissions SET score = ? WHERE id = ?")
            .bind(score.to_string())
            .bind(submission_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Schema(format!(
                "no submission with id {submission_id}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
