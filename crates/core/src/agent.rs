//! Agent run configuration.

use serde::{Deserialize, Serialize};

use crate::llm::LlmParams;

/// Configuration shared by every run of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt prepended to a fresh history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Maximum node executions per run (safety limit)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Sampling parameters for every LLM request
    #[serde(default)]
    pub params: LlmParams,
}

fn default_max_iterations() -> usize {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: default_max_iterations(),
            params: LlmParams::default(),
        }
    }
}

impl AgentConfig {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}
