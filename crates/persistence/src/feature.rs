//! The Persistency feature: checkpoints for agent runs.
//!
//! Installed into an agent, it hooks three pipeline events:
//!
//! - **agent starting**: roll the fresh context back to the latest checkpoint
//!   (when `rollback_on_start` is set), so the run resumes where the last
//!   unfinished run stopped
//! - **after node**: with automatic persistence, snapshot the history and the
//!   successor execution point
//! - **agent finished**: with automatic persistence, write a tombstone so the
//!   next run starts fresh
//!
//! Checkpoint timestamps produced by one instance are strictly increasing,
//! even when the clock does not advance between two writes.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use weft_agent::context::AgentContext;
use weft_agent::error::AgentError;
use weft_agent::feature::Feature;
use weft_agent::pipeline::{AfterNode, AgentFinished, AgentStarting, Pipeline};
use weft_agent::value::NodeValue;
use weft_core::checkpoint::{AgentCheckpointData, CheckpointStorage};
use weft_core::error::PersistenceError;
use weft_core::message::Message;

use crate::noop::NoopStorage;

pub struct PersistencyConfig {
    pub storage: Arc<dyn CheckpointStorage>,
    /// Checkpoint after every node and tombstone after every successful run.
    pub enable_automatic_persistence: bool,
    /// Resume from the latest checkpoint when a run starts.
    pub rollback_on_start: bool,
}

impl Default for PersistencyConfig {
    fn default() -> Self {
        Self {
            storage: Arc::new(NoopStorage),
            enable_automatic_persistence: false,
            rollback_on_start: true,
        }
    }
}

impl std::fmt::Debug for PersistencyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistencyConfig")
            .field("storage", &self.storage.name())
            .field("enable_automatic_persistence", &self.enable_automatic_persistence)
            .field("rollback_on_start", &self.rollback_on_start)
            .finish()
    }
}

pub struct Persistency {
    storage: Arc<dyn CheckpointStorage>,
    automatic: bool,
    rollback_on_start: bool,
    last_created_at: Mutex<Option<DateTime<Utc>>>,
}

impl Feature for Persistency {
    type Config = PersistencyConfig;
    const KEY: &'static str = "weft.persistency";

    fn install(config: PersistencyConfig, pipeline: &mut Pipeline) -> Result<Arc<Self>, AgentError> {
        let feature = Arc::new(Self::new(config));
        info!(
            storage = feature.storage.name(),
            automatic = feature.automatic,
            rollback_on_start = feature.rollback_on_start,
            "Installing persistency"
        );

        if feature.rollback_on_start {
            let f = Arc::clone(&feature);
            pipeline.intercept::<AgentStarting, _>(move |ctx, _event| {
                let f = Arc::clone(&f);
                Box::pin(async move {
                    f.rollback_to_latest_checkpoint(ctx).await?;
                    Ok(())
                })
            });
        }

        if feature.automatic {
            let f = Arc::clone(&feature);
            pipeline.intercept::<AfterNode, _>(move |ctx, event| {
                let f = Arc::clone(&f);
                Box::pin(async move {
                    f.create_checkpoint(ctx, &event.next.node_id, &event.next.input, None)
                        .await?;
                    Ok(())
                })
            });

            let f = Arc::clone(&feature);
            pipeline.intercept::<AgentFinished, _>(move |ctx, _event| {
                let f = Arc::clone(&f);
                Box::pin(async move {
                    f.write_tombstone(ctx.agent_id()).await?;
                    Ok(())
                })
            });
        }

        Ok(feature)
    }
}

impl Persistency {
    pub fn new(config: PersistencyConfig) -> Self {
        Self {
            storage: config.storage,
            automatic: config.enable_automatic_persistence,
            rollback_on_start: config.rollback_on_start,
            last_created_at: Mutex::new(None),
        }
    }

    pub fn storage(&self) -> &Arc<dyn CheckpointStorage> {
        &self.storage
    }

    pub fn rollback_on_start(&self) -> bool {
        self.rollback_on_start
    }

    /// A creation time strictly after every one this instance handed out.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_created_at.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let next = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }

    /// Snapshot the context's history with `node_id` / `last_input` as the
    /// point to resume at, and save it.
    ///
    /// Returns `Ok(None)` without touching storage when `last_input` cannot
    /// be serialized. Storage write failures are returned.
    pub async fn create_checkpoint(
        &self,
        ctx: &AgentContext,
        node_id: &str,
        last_input: &NodeValue,
        checkpoint_id: Option<String>,
    ) -> Result<Option<AgentCheckpointData>, AgentError> {
        let input = match last_input.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    agent_id = %ctx.agent_id(),
                    node = %node_id,
                    input = last_input.kind(),
                    error = %e,
                    "Input is not serializable, skipping checkpoint"
                );
                return Ok(None);
            }
        };

        let mut checkpoint = AgentCheckpointData::new(ctx.agent_id(), node_id, input, ctx.history().to_vec())
            .with_created_at(self.next_timestamp());
        if let Some(id) = checkpoint_id {
            checkpoint = checkpoint.with_id(id);
        }

        self.save_checkpoint(&checkpoint).await?;
        Ok(Some(checkpoint))
    }

    pub async fn save_checkpoint(&self, checkpoint: &AgentCheckpointData) -> Result<(), PersistenceError> {
        self.storage.save_checkpoint(checkpoint).await?;
        debug!(
            agent_id = %checkpoint.agent_id,
            checkpoint_id = %checkpoint.checkpoint_id,
            node = %checkpoint.node_id,
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn write_tombstone(&self, agent_id: &str) -> Result<(), PersistenceError> {
        let tombstone = AgentCheckpointData::tombstone(agent_id).with_created_at(self.next_timestamp());
        self.save_checkpoint(&tombstone).await
    }

    pub async fn get_latest_checkpoint(&self, agent_id: &str) -> Result<Option<AgentCheckpointData>, PersistenceError> {
        self.storage.get_latest_checkpoint(agent_id).await
    }

    pub async fn get_checkpoint_by_id(
        &self,
        agent_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<AgentCheckpointData>, PersistenceError> {
        self.storage.get_checkpoint(agent_id, checkpoint_id).await
    }

    /// Restore the context from the checkpoint with `checkpoint_id`.
    ///
    /// Returns the applied checkpoint, or `None` (context untouched) when it
    /// does not exist, is a tombstone, or its input cannot be decoded.
    pub async fn rollback_to_checkpoint(
        &self,
        checkpoint_id: &str,
        ctx: &mut AgentContext,
    ) -> Result<Option<AgentCheckpointData>, AgentError> {
        let Some(checkpoint) = self.get_checkpoint_by_id(ctx.agent_id(), checkpoint_id).await? else {
            debug!(agent_id = %ctx.agent_id(), checkpoint_id, "No such checkpoint");
            return Ok(None);
        };
        if checkpoint.is_tombstone() {
            return Ok(None);
        }
        Ok(decode_input(&checkpoint).map(|input| self.restore(ctx, checkpoint, input)))
    }

    /// Restore the context from the agent's latest usable checkpoint.
    ///
    /// See [`resume_point`](Self::resume_point) for which checkpoint that is.
    /// Without one the context is left untouched.
    pub async fn rollback_to_latest_checkpoint(
        &self,
        ctx: &mut AgentContext,
    ) -> Result<Option<AgentCheckpointData>, AgentError> {
        match self.resume_point(ctx.agent_id()).await? {
            Some((checkpoint, input)) => Ok(Some(self.restore(ctx, checkpoint, input))),
            None => Ok(None),
        }
    }

    /// The checkpoint the next run of `agent_id` resumes from, with its
    /// decoded input.
    ///
    /// `None` when there is no checkpoint or the latest is a tombstone. A
    /// checkpoint whose input cannot be decoded is skipped in favour of the
    /// one before it, back to the previous tombstone.
    pub async fn resume_point(&self, agent_id: &str) -> Result<Option<(AgentCheckpointData, NodeValue)>, PersistenceError> {
        let Some(latest) = self.get_latest_checkpoint(agent_id).await? else {
            debug!(agent_id, "No checkpoint to roll back to");
            return Ok(None);
        };
        if latest.is_tombstone() {
            debug!(agent_id, "Last run finished, starting fresh");
            return Ok(None);
        }
        if let Some(input) = decode_input(&latest) {
            return Ok(Some((latest, input)));
        }

        let mut older = self.storage.get_checkpoints(agent_id).await?;
        older.retain(|c| c.created_at < latest.created_at);
        older.sort_by_key(|c| std::cmp::Reverse(c.created_at));
        for checkpoint in older {
            if checkpoint.is_tombstone() {
                break;
            }
            if let Some(input) = decode_input(&checkpoint) {
                return Ok(Some((checkpoint, input)));
            }
        }
        warn!(agent_id, "No usable checkpoint, starting fresh");
        Ok(None)
    }

    fn restore(&self, ctx: &mut AgentContext, checkpoint: AgentCheckpointData, input: NodeValue) -> AgentCheckpointData {
        info!(
            agent_id = %ctx.agent_id(),
            checkpoint_id = %checkpoint.checkpoint_id,
            node = %checkpoint.node_id,
            "Rolling back to checkpoint"
        );
        self.set_execution_point(ctx, &checkpoint.node_id, checkpoint.message_history.clone(), input);
        checkpoint
    }

    /// Overwrite the context's history and execution point.
    pub fn set_execution_point(&self, ctx: &mut AgentContext, node_id: &str, history: Vec<Message>, input: NodeValue) {
        ctx.set_execution_point(node_id, history, input);
    }
}

fn decode_input(checkpoint: &AgentCheckpointData) -> Option<NodeValue> {
    match NodeValue::from_json(checkpoint.last_input.clone()) {
        Ok(input) => Some(input),
        Err(e) => {
            warn!(
                agent_id = %checkpoint.agent_id,
                checkpoint_id = %checkpoint.checkpoint_id,
                node = %checkpoint.node_id,
                error = %e,
                "Skipping checkpoint with undecodable input"
            );
            None
        }
    }
}
