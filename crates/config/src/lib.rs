//! Configuration loading and validation for weft.
//!
//! Loads `~/.weft/config.toml` (defaults when absent), applies environment
//! overrides, and validates every section before anything uses it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use weft_core::agent::AgentConfig;

/// Storage backends a config may name.
pub const STORAGE_BACKENDS: &[&str] = &["file", "memory", "sqlite", "none"];

/// The root configuration structure, mapping to `~/.weft/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub persistence: PersistenceSection,

    #[serde(default)]
    pub telemetry: TelemetrySection,

    #[serde(default)]
    pub planner: PlannerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Agent id; checkpoints are grouped by it
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// Model identifier handed to the LLM executor
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum node executions per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_agent_id() -> String {
    "default".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_max_iterations() -> usize {
    50
}
fn default_true() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            model: default_model(),
            max_iterations: default_max_iterations(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSection {
    /// "file", "memory", "sqlite" or "none"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Root directory for file checkpoints (default: ~/.weft/checkpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,

    /// Database file for the sqlite backend (default: ~/.weft/checkpoints.db)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,

    /// Checkpoint after every node
    #[serde(default = "default_true")]
    pub automatic: bool,

    /// Resume from the latest checkpoint when a run starts
    #[serde(default = "default_true")]
    pub rollback_on_start: bool,
}

fn default_backend() -> String {
    "file".into()
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root_dir: None,
            sqlite_path: None,
            automatic: true,
            rollback_on_start: true,
        }
    }
}

impl PersistenceSection {
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("checkpoints"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("checkpoints.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Traces kept in memory before the oldest finished ones are pruned
    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
}

fn default_max_traces() -> usize {
    1_000
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_traces: default_max_traces(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_max_replans")]
    pub max_replans: usize,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_max_replans() -> usize {
    3
}
fn default_max_tool_rounds() -> usize {
    5
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_replans: default_max_replans(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl AppConfig {
    /// Load from `~/.weft/config.toml`, then apply environment overrides:
    ///
    /// - `WEFT_AGENT_ID`
    /// - `WEFT_MODEL`
    /// - `WEFT_CHECKPOINT_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in [`load`](Self::load)).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("WEFT_AGENT_ID") {
            self.agent.id = id;
        }
        if let Some(model) = lookup("WEFT_MODEL") {
            self.agent.model = model;
        }
        if let Some(dir) = lookup("WEFT_CHECKPOINT_DIR") {
            self.persistence.root_dir = Some(PathBuf::from(dir));
        }
    }

    /// `~/.weft`
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".weft")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.id.trim().is_empty() {
            return Err(ConfigError::ValidationError("agent.id must not be empty".into()));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError("agent.max_iterations must be > 0".into()));
        }
        if !STORAGE_BACKENDS.contains(&self.persistence.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "persistence.backend must be one of {}, got {:?}",
                STORAGE_BACKENDS.join(", "),
                self.persistence.backend
            )));
        }
        if self.telemetry.max_traces == 0 {
            return Err(ConfigError::ValidationError("telemetry.max_traces must be > 0".into()));
        }
        Ok(())
    }

    /// Per-run engine configuration derived from the `agent` section.
    pub fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::default().with_max_iterations(self.agent.max_iterations);
        if let Some(prompt) = &self.agent.system_prompt {
            config = config.with_system_prompt(prompt);
        }
        config
    }

    /// A default config as TOML (for `weft config --default`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
