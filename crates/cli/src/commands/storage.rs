//! Open the checkpoint storage named by the config.

use std::sync::Arc;

use weft_config::AppConfig;
use weft_core::checkpoint::CheckpointStorage;
use weft_persistence::{FileStorage, InMemoryStorage, NoopStorage, SqliteStorage};

pub async fn open(config: &AppConfig) -> Result<Arc<dyn CheckpointStorage>, Box<dyn std::error::Error>> {
    let storage: Arc<dyn CheckpointStorage> = match config.persistence.backend.as_str() {
        "file" => Arc::new(FileStorage::new(config.persistence.checkpoint_dir())),
        "sqlite" => {
            let path = config.persistence.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(SqliteStorage::new(&format!("sqlite://{}", path.display())).await?)
        }
        "memory" => Arc::new(InMemoryStorage::new()),
        "none" => Arc::new(NoopStorage),
        other => return Err(format!("Unknown storage backend: {other}").into()),
    };
    tracing::debug!(backend = storage.name(), "Opened checkpoint storage");
    Ok(storage)
}

/// Agent ids that have checkpoints, for backends that can enumerate them.
pub async fn agent_ids(config: &AppConfig) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    match config.persistence.backend.as_str() {
        "file" => Ok(FileStorage::new(config.persistence.checkpoint_dir()).agent_ids().await?),
        "sqlite" => {
            let path = config.persistence.database_path();
            if !path.exists() {
                return Ok(Vec::new());
            }
            let storage = SqliteStorage::new(&format!("sqlite://{}", path.display())).await?;
            Ok(storage.agent_ids().await?)
        }
        _ => Ok(Vec::new()),
    }
}
