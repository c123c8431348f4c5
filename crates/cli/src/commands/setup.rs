//! Engine configuration derived from the loaded [`AppConfig`].

use std::sync::Arc;

use weft_agent::patterns::planner::PlannerConfig;
use weft_config::AppConfig;
use weft_core::checkpoint::CheckpointStorage;
use weft_persistence::PersistencyConfig;

pub fn planner_config(config: &AppConfig) -> PlannerConfig {
    PlannerConfig {
        max_replans: config.planner.max_replans,
        max_tool_rounds: config.planner.max_tool_rounds,
    }
}

pub fn persistency_config(config: &AppConfig, storage: Arc<dyn CheckpointStorage>) -> PersistencyConfig {
    PersistencyConfig {
        storage,
        enable_automatic_persistence: config.persistence.automatic,
        rollback_on_start: config.persistence.rollback_on_start,
    }
}

/// Split `agent.model` into provider and model id. A bare id has no provider.
pub fn model_parts(config: &AppConfig) -> (Option<&str>, &str) {
    match config.agent.model.split_once('/') {
        Some((provider, id)) if !provider.is_empty() && !id.is_empty() => (Some(provider), id),
        _ => (None, config.agent.model.as_str()),
    }
}
