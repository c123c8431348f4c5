//! File-based checkpoint storage.
//!
//! Layout: one directory per agent under the root, one pretty-printed JSON
//! file per checkpoint.
//!
//! ```text
//! <root>/
//!   <agent_id>/
//!     <checkpoint_id>.json
//! ```
//!
//! Files are human-inspectable and can be deleted by hand. A file that fails
//! to read or parse is logged and skipped; it never hides the rest.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use weft_core::checkpoint::{AgentCheckpointData, CheckpointStorage};
use weft_core::error::PersistenceError;

pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default root: `~/.weft/checkpoints`
    pub fn default_root() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".weft").join("checkpoints")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn agent_dir(&self, agent_id: &str) -> Result<PathBuf, PersistenceError> {
        validate_component("agent id", agent_id)?;
        Ok(self.root.join(agent_id))
    }

    /// Agent ids with a checkpoint directory under the root.
    pub async fn agent_ids(&self) -> Result<Vec<String>, PersistenceError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::Storage(format!("{}: {e}", self.root.display()))),
        };
        let mut ids = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| PersistenceError::Storage(format!("{}: {e}", self.root.display())))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn read_checkpoint(path: &Path) -> Option<AgentCheckpointData> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint");
                return None;
            }
        };
        match serde_json::from_str::<AgentCheckpointData>(&content) {
            Ok(cp) => Some(cp),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupt checkpoint");
                None
            }
        }
    }
}

/// Reject ids that would escape the storage root.
fn validate_component(what: &str, value: &str) -> Result<(), PersistenceError> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(PersistenceError::Storage(format!("invalid {what}: {value:?}")));
    }
    Ok(())
}

#[async_trait]
impl CheckpointStorage for FileStorage {
    fn name(&self) -> &str { "file" }

    async fn get_checkpoints(&self, agent_id: &str) -> Result<Vec<AgentCheckpointData>, PersistenceError> {
        let dir_path = self.agent_dir(agent_id)?;
        let mut dir = match tokio::fs::read_dir(&dir_path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::Storage(format!("{}: {e}", dir_path.display()))),
        };

        let mut checkpoints = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir_path.display(), error = %e, "Stopping checkpoint scan early");
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(cp) = Self::read_checkpoint(&path).await {
                checkpoints.push(cp);
            }
        }

        debug!(agent_id, count = checkpoints.len(), "Loaded checkpoints from disk");
        Ok(checkpoints)
    }

    async fn save_checkpoint(&self, checkpoint: &AgentCheckpointData) -> Result<(), PersistenceError> {
        validate_component("checkpoint id", &checkpoint.checkpoint_id)?;
        let dir = self.agent_dir(&checkpoint.agent_id)?;
        let write_failed = |reason: String| PersistenceError::WriteFailed {
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            reason,
        };

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| write_failed(format!("create {}: {e}", dir.display())))?;

        let json = serde_json::to_string_pretty(checkpoint).map_err(|e| write_failed(e.to_string()))?;

        // Readers never see a partial file.
        let path = dir.join(format!("{}.json", checkpoint.checkpoint_id));
        let tmp = dir.join(format!(".{}.json.tmp", checkpoint.checkpoint_id));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| write_failed(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| write_failed(format!("rename to {}: {e}", path.display())))?;

        debug!(agent_id = %checkpoint.agent_id, checkpoint_id = %checkpoint.checkpoint_id, node = %checkpoint.node_id, "Checkpoint written");
        Ok(())
    }

    async fn get_checkpoint(
        &self,
        agent_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<AgentCheckpointData>, PersistenceError> {
        validate_component("checkpoint id", checkpoint_id)?;
        let path = self.agent_dir(agent_id)?.join(format!("{checkpoint_id}.json"));
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        Ok(Self::read_checkpoint(&path).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use weft_core::message::Message;

    fn checkpoint(id: &str, offset_secs: i64) -> AgentCheckpointData {
        AgentCheckpointData::new("agent-1", "call_llm", serde_json::json!({"type": "text", "value": "hi"}), vec![
            Message::user("hi"),
        ])
        .with_id(id)
        .with_created_at(Utc::now() + Duration::seconds(offset_secs))
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path());
        let cp = checkpoint("cp-1", 0);

        storage.save_checkpoint(&cp).await.unwrap();

        let file = tmp.path().join("agent-1").join("cp-1.json");
        let raw = std::fs::read_to_string(&file).unwrap();
        // Pretty-printed with camelCase keys.
        assert!(raw.contains("\n  \"checkpointId\": \"cp-1\""));

        let loaded = storage.get_checkpoint("agent-1", "cp-1").await.unwrap().unwrap();
        assert_eq!(loaded, cp);
    }

    #[tokio::test]
    async fn latest_is_greatest_timestamp() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path());
        storage.save_checkpoint(&checkpoint("b", 20)).await.unwrap();
        storage.save_checkpoint(&checkpoint("c", 30)).await.unwrap();
        storage.save_checkpoint(&checkpoint("a", 10)).await.unwrap();

        let latest = storage.get_latest_checkpoint("agent-1").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, "c");
    }

    #[tokio::test]
    async fn corrupt_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path());
        storage.save_checkpoint(&checkpoint("good", 0)).await.unwrap();
        std::fs::write(tmp.path().join("agent-1").join("bad.json"), "{not json").unwrap();
        std::fs::write(tmp.path().join("agent-1").join("notes.txt"), "ignored").unwrap();

        let all = storage.get_checkpoints("agent-1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].checkpoint_id, "good");
        assert!(storage.get_checkpoint("agent-1", "bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_agent_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path().join("never-created"));
        assert!(storage.get_checkpoints("nobody").await.unwrap().is_empty());
        assert!(storage.get_latest_checkpoint("nobody").await.unwrap().is_none());
        assert!(storage.agent_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_agents_and_rejects_path_escapes() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path());
        storage.save_checkpoint(&checkpoint("x", 0)).await.unwrap();
        assert_eq!(storage.agent_ids().await.unwrap(), vec!["agent-1".to_string()]);

        let escaping = checkpoint("y", 0);
        let escaping = AgentCheckpointData {
            agent_id: "../outside".into(),
            ..escaping
        };
        assert!(storage.save_checkpoint(&escaping).await.is_err());
    }
}
