//! SQLite participant store (via `sqlx`).
//!
//! One row per participant; predictions are embedded as a JSON array in
//! the `predictions` column. Saves are guarded by `WHERE version = ?` so a
//! stale writer updates zero rows and gets a `VersionConflict`.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

use super::{ParticipantStore, StoreError};
use crate::types::{Participant, Prediction};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS participants (\
    id TEXT PRIMARY KEY,\
    name TEXT NOT NULL,\
    email TEXT NOT NULL,\
    score INTEGER NOT NULL DEFAULT 0,\
    version INTEGER NOT NULL DEFAULT 0,\
    predictions TEXT NOT NULL DEFAULT '[]'\
)";

const EMAIL_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS participants_email ON participants (email)";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite://participants.db?mode=rwc` or
    /// `sqlite::memory:`) and create the schema if needed.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // In-memory databases are per-connection, so pin the pool to one.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to SQLite at {url}"))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create participants table")?;
        sqlx::query(EMAIL_INDEX)
            .execute(&pool)
            .await
            .context("Failed to create participants email index")?;

        info!(url, "SQLite participant store ready");
        Ok(Self { pool })
    }

    async fn fetch_version(&self, id: &str) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT version FROM participants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read participant version")?;
        Ok(row.map(|r| r.get::<i64, _>("version") as u64))
    }
}

fn encode_predictions(predictions: &[Prediction]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(predictions).context("Failed to serialise predictions")?)
}

fn decode_row(row: &SqliteRow) -> Result<Participant, StoreError> {
    let id: String = row.get("id");
    let predictions: String = row.get("predictions");
    let predictions: Vec<Prediction> = serde_json::from_str(&predictions)
        .with_context(|| format!("Corrupt predictions column for participant {id}"))?;
    Ok(Participant {
        name: row.get("name"),
        email: row.get("email"),
        score: row.get("score"),
        version: row.get::<i64, _>("version") as u64,
        predictions,
        id,
    })
}

#[async_trait]
impl ParticipantStore for SqliteStore {
    async fn load(&self, id: &str) -> Result<Option<Participant>, StoreError> {
        let row = sqlx::query("SELECT * FROM participants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load participant")?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Participant>, StoreError> {
        let row = sqlx::query("SELECT * FROM participants WHERE email = ? LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up participant by email")?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Participant>, StoreError> {
        let rows = sqlx::query("SELECT * FROM participants ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list participants")?;
        rows.iter().map(decode_row).collect()
    }

    async fn insert(&self, participant: Participant) -> Result<Participant, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO participants (id, name, email, score, version, predictions) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&participant.id)
        .bind(&participant.name)
        .bind(&participant.email)
        .bind(participant.score)
        .bind(participant.version as i64)
        .bind(encode_predictions(&participant.predictions)?)
        .execute(&self.pool)
        .await
        .context("Failed to insert participant")?;

        // Ignored rows hit either the primary key or the email index.
        if result.rows_affected() == 0 {
            if self.fetch_version(&participant.id).await?.is_some() {
                return Err(StoreError::Duplicate(participant.id));
            }
            return Err(StoreError::EmailTaken(participant.email));
        }
        Ok(participant)
    }

    async fn save(&self, participant: &Participant) -> Result<Participant, StoreError> {
        let next = participant.version + 1;
        let result = sqlx::query(
            "UPDATE participants SET name = ?, email = ?, score = ?, predictions = ?, version = ? \
             WHERE id = ? AND version = ?",
        )
        .bind(&participant.name)
        .bind(&participant.email)
        .bind(participant.score)
        .bind(encode_predictions(&participant.predictions)?)
        .bind(next as i64)
        .bind(&participant.id)
        .bind(participant.version as i64)
        .execute(&self.pool)
        .await
        .context("Failed to update participant")?;

        if result.rows_affected() == 0 {
            return match self.fetch_version(&participant.id).await? {
                Some(found) => Err(StoreError::VersionConflict {
                    id: participant.id.clone(),
                    expected: participant.version,
                    found,
                }),
                None => Err(StoreError::NotFound(participant.id.clone())),
            };
        }

        let mut updated = participant.clone();
        updated.version = next;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM participants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete participant")?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
