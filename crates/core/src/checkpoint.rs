//! Checkpoint data and the storage trait behind persistence.
//!
//! A checkpoint is an immutable snapshot of a run: message history, the node
//! to resume at and that node's input. Checkpoints for one agent are totally
//! ordered by `created_at`; the latest is the one with the greatest timestamp.
//!
//! Concurrent writers for the same agent id are not serialized by any
//! storage: whichever checkpoint carries the greatest timestamp wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::message::Message;

/// Node id marking a run that completed; resuming from it is a no-op.
pub const TOMBSTONE_NODE_ID: &str = "__tombstone__";

/// A persisted snapshot of an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCheckpointData {
    pub checkpoint_id: String,
    pub agent_id: String,
    pub node_id: String,
    pub last_input: serde_json::Value,
    pub message_history: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl AgentCheckpointData {
    pub fn new(
        agent_id: impl Into<String>,
        node_id: impl Into<String>,
        last_input: serde_json::Value,
        message_history: Vec<Message>,
    ) -> Self {
        Self {
            checkpoint_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            node_id: node_id.into(),
            last_input,
            message_history,
            created_at: Utc::now(),
        }
    }

    /// A terminal checkpoint recording that the agent's last run finished.
    pub fn tombstone(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, TOMBSTONE_NODE_ID, serde_json::Value::Null, Vec::new())
    }

    pub fn with_id(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = checkpoint_id.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_tombstone(&self) -> bool {
        self.node_id == TOMBSTONE_NODE_ID
    }
}

/// Pick the checkpoint with the greatest `created_at`.
pub fn latest_of(checkpoints: Vec<AgentCheckpointData>) -> Option<AgentCheckpointData> {
    checkpoints.into_iter().max_by_key(|c| c.created_at)
}

/// Pluggable checkpoint storage.
///
/// Implementations: file (one directory per agent), SQLite, in-memory, none (no-op).
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// The storage name (e.g., "file", "sqlite", "none").
    fn name(&self) -> &str;

    /// All readable checkpoints for an agent, in no particular order.
    ///
    /// Entries that cannot be read or decoded are skipped, not fatal.
    async fn get_checkpoints(&self, agent_id: &str) -> Result<Vec<AgentCheckpointData>, PersistenceError>;

    /// Persist a checkpoint. Write failures are returned to the caller.
    async fn save_checkpoint(&self, checkpoint: &AgentCheckpointData) -> Result<(), PersistenceError>;

    async fn get_latest_checkpoint(&self, agent_id: &str) -> Result<Option<AgentCheckpointData>, PersistenceError> {
        Ok(latest_of(self.get_checkpoints(agent_id).await?))
    }

    async fn get_checkpoint(
        &self,
        agent_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<AgentCheckpointData>, PersistenceError> {
        Ok(self
            .get_checkpoints(agent_id)
            .await?
            .into_iter()
            .find(|c| c.checkpoint_id == checkpoint_id))
    }
}
