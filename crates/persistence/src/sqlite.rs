//! SQLite checkpoint storage.
//!
//! One table, `checkpoints`, keyed by checkpoint id and indexed by
//! `(agent_id, created_at)`. Timestamps are stored as fixed-width RFC 3339
//! strings (microsecond precision, `Z` suffix) so that text ordering matches
//! time ordering. History and last input are JSON text columns.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};
use weft_core::checkpoint::{AgentCheckpointData, CheckpointStorage};
use weft_core::error::PersistenceError;
use weft_core::message::Message;

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| PersistenceError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database lives in a single connection.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| PersistenceError::Storage(format!("Failed to open SQLite: {e}")))?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        info!("SQLite checkpoint storage initialized at {path}");
        Ok(storage)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, PersistenceError> {
        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                checkpoint_id   TEXT PRIMARY KEY NOT NULL,
                agent_id        TEXT NOT NULL,
                node_id         TEXT NOT NULL,
                last_input      TEXT NOT NULL,
                message_history TEXT NOT NULL,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::MigrationFailed(format!("checkpoints table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_checkpoints_agent_created ON checkpoints(agent_id, created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::MigrationFailed(format!("agent/created_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Agent ids that have at least one checkpoint.
    pub async fn agent_ids(&self) -> Result<Vec<String>, PersistenceError> {
        let rows = sqlx::query("SELECT DISTINCT agent_id FROM checkpoints ORDER BY agent_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceError::Storage(format!("agent query: {e}")))?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("agent_id")
                    .map_err(|e| PersistenceError::Storage(format!("agent_id column: {e}")))
            })
            .collect()
    }

    fn timestamp(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn row_to_checkpoint(row: &SqliteRow) -> Result<AgentCheckpointData, PersistenceError> {
        let column = |name: &str| -> Result<String, PersistenceError> {
            row.try_get::<String, _>(name).map_err(|e| PersistenceError::Corrupt {
                location: "checkpoints row".into(),
                reason: format!("{name} column: {e}"),
            })
        };
        let checkpoint_id = column("checkpoint_id")?;
        let corrupt = |reason: String| PersistenceError::Corrupt {
            location: format!("checkpoints/{checkpoint_id}"),
            reason,
        };

        let last_input: serde_json::Value =
            serde_json::from_str(&column("last_input")?).map_err(|e| corrupt(format!("last_input: {e}")))?;
        let message_history: Vec<Message> = serde_json::from_str(&column("message_history")?)
            .map_err(|e| corrupt(format!("message_history: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&column("created_at")?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("created_at: {e}")))?;

        Ok(AgentCheckpointData {
            agent_id: column("agent_id")?,
            node_id: column("node_id")?,
            checkpoint_id,
            last_input,
            message_history,
            created_at,
        })
    }

    /// Decode rows, logging and dropping the ones that fail.
    fn decode_rows(rows: &[SqliteRow]) -> Vec<AgentCheckpointData> {
        rows.iter()
            .filter_map(|row| match Self::row_to_checkpoint(row) {
                Ok(cp) => Some(cp),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable checkpoint row");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl CheckpointStorage for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_checkpoints(&self, agent_id: &str) -> Result<Vec<AgentCheckpointData>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM checkpoints WHERE agent_id = ?1 ORDER BY created_at")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceError::Storage(format!("checkpoint query: {e}")))?;
        Ok(Self::decode_rows(&rows))
    }

    async fn save_checkpoint(&self, checkpoint: &AgentCheckpointData) -> Result<(), PersistenceError> {
        let write_failed = |reason: String| PersistenceError::WriteFailed {
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            reason,
        };
        let last_input = serde_json::to_string(&checkpoint.last_input).map_err(|e| write_failed(e.to_string()))?;
        let history = serde_json::to_string(&checkpoint.message_history).map_err(|e| write_failed(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (checkpoint_id, agent_id, node_id, last_input, message_history, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(checkpoint_id) DO UPDATE SET
                agent_id = excluded.agent_id,
                node_id = excluded.node_id,
                last_input = excluded.last_input,
                message_history = excluded.message_history,
                created_at = excluded.created_at
            "#,
        )
        .bind(&checkpoint.checkpoint_id)
        .bind(&checkpoint.agent_id)
        .bind(&checkpoint.node_id)
        .bind(last_input)
        .bind(history)
        .bind(Self::timestamp(&checkpoint.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| write_failed(e.to_string()))?;

        debug!(agent_id = %checkpoint.agent_id, checkpoint_id = %checkpoint.checkpoint_id, "Checkpoint stored");
        Ok(())
    }

    async fn get_latest_checkpoint(&self, agent_id: &str) -> Result<Option<AgentCheckpointData>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE agent_id = ?1 ORDER BY created_at DESC LIMIT 1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Storage(format!("latest query: {e}")))?;
        let Some(row) = row else {
            return Ok(None);
        };
        match Self::row_to_checkpoint(&row) {
            Ok(cp) => Ok(Some(cp)),
            Err(e) => {
                // Newest row is unreadable; fall back to the newest readable one.
                warn!(error = %e, agent_id, "Latest checkpoint row is undecodable");
                Ok(weft_core::checkpoint::latest_of(self.get_checkpoints(agent_id).await?))
            }
        }
    }

    async fn get_checkpoint(
        &self,
        agent_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<AgentCheckpointData>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE agent_id = ?1 AND checkpoint_id = ?2")
            .bind(agent_id)
            .bind(checkpoint_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Storage(format!("checkpoint lookup: {e}")))?;
        Ok(row.as_ref().and_then(|r| Self::decode_rows(std::slice::from_ref(r)).pop()))
    }
}
