//! No-op checkpoint storage: persistence disabled.

use async_trait::async_trait;
use weft_core::checkpoint::{AgentCheckpointData, CheckpointStorage};
use weft_core::error::PersistenceError;

/// Storage that keeps nothing. Reads are always empty; writes always succeed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorage;

#[async_trait]
impl CheckpointStorage for NoopStorage {
    fn name(&self) -> &str { "none" }

    async fn get_checkpoints(&self, _agent_id: &str) -> Result<Vec<AgentCheckpointData>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn save_checkpoint(&self, _checkpoint: &AgentCheckpointData) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn get_latest_checkpoint(&self, _agent_id: &str) -> Result<Option<AgentCheckpointData>, PersistenceError> {
        Ok(None)
    }
}
