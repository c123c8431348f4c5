//! In-memory checkpoint storage, for tests and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use weft_core::checkpoint::{AgentCheckpointData, CheckpointStorage};
use weft_core::error::PersistenceError;

/// Checkpoints grouped by agent id, kept for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    checkpoints: Arc<RwLock<HashMap<String, Vec<AgentCheckpointData>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints stored for `agent_id`.
    pub async fn count(&self, agent_id: &str) -> usize {
        self.checkpoints.read().await.get(agent_id).map_or(0, Vec::len)
    }

    /// Drop everything stored for `agent_id`.
    pub async fn clear(&self, agent_id: &str) {
        self.checkpoints.write().await.remove(agent_id);
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryStorage {
    fn name(&self) -> &str { "memory" }

    async fn get_checkpoints(&self, agent_id: &str) -> Result<Vec<AgentCheckpointData>, PersistenceError> {
        Ok(self
            .checkpoints
            .read()
            .await
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_checkpoint(&self, checkpoint: &AgentCheckpointData) -> Result<(), PersistenceError> {
        let mut map = self.checkpoints.write().await;
        let entries = map.entry(checkpoint.agent_id.clone()).or_default();
        // Same id overwrites, like a file rewritten in place.
        entries.retain(|c| c.checkpoint_id != checkpoint.checkpoint_id);
        entries.push(checkpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn checkpoint(agent: &str, id: &str, offset_secs: i64) -> AgentCheckpointData {
        AgentCheckpointData::new(agent, "node", serde_json::Value::Null, vec![])
            .with_id(id)
            .with_created_at(Utc::now() + Duration::seconds(offset_secs))
    }

    #[tokio::test]
    async fn latest_wins_regardless_of_insertion_order() {
        let storage = InMemoryStorage::new();
        storage.save_checkpoint(&checkpoint("a", "late", 10)).await.unwrap();
        storage.save_checkpoint(&checkpoint("a", "early", 0)).await.unwrap();

        let latest = storage.get_latest_checkpoint("a").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, "late");
        assert_eq!(storage.count("a").await, 2);
    }

    #[tokio::test]
    async fn agents_are_isolated() {
        let storage = InMemoryStorage::new();
        storage.save_checkpoint(&checkpoint("a", "1", 0)).await.unwrap();

        assert!(storage.get_latest_checkpoint("b").await.unwrap().is_none());
        assert!(storage.get_checkpoint("a", "1").await.unwrap().is_some());

        storage.clear("a").await;
        assert_eq!(storage.count("a").await, 0);
    }

    #[tokio::test]
    async fn saving_an_existing_id_replaces_it() {
        let storage = InMemoryStorage::new();
        storage.save_checkpoint(&checkpoint("a", "same", 0)).await.unwrap();
        storage.save_checkpoint(&checkpoint("a", "same", 5)).await.unwrap();
        assert_eq!(storage.count("a").await, 1);
    }
}
