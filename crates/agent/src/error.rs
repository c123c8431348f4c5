//! Errors raised by the execution engine.

use thiserror::Error;
use weft_core::error::{LlmError, PersistenceError, ToolError};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The agent was assembled inconsistently (duplicate feature, bad edge, ...).
    #[error("Invalid agent configuration: {0}")]
    Configuration(String),

    #[error("Strategy `{strategy}` has duplicate node names: {names:?}")]
    DuplicateNodeNames { strategy: String, names: Vec<String> },

    #[error("Strategy `{strategy}` has no node named `{node}`")]
    UnknownNode { strategy: String, node: String },

    #[error("Node `{node}` in strategy `{strategy}` has no edge matching its output")]
    NoSuccessor { strategy: String, node: String },

    #[error("Strategy `{strategy}` exceeded {limit} node executions")]
    IterationLimit { strategy: String, limit: usize },

    #[error("Node `{node}` expected {expected} input, got {found}")]
    UnexpectedInput {
        node: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Feature not installed: {0}")]
    FeatureNotInstalled(String),

    #[error("Feature `{key}` is not a {expected}")]
    FeatureTypeMismatch { key: String, expected: &'static str },

    #[error("No value stored under `{0}`")]
    StorageMissing(String),

    #[error("Value stored under `{key}` is not a {expected}")]
    StorageTypeMismatch { key: String, expected: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_name_the_offender() {
        let err = AgentError::NoSuccessor {
            strategy: "single_run".into(),
            node: "call_llm".into(),
        };
        assert!(err.to_string().contains("call_llm"));

        let err: AgentError = LlmError::Timeout("30s".into()).into();
        assert!(matches!(err, AgentError::Llm(_)));
    }
}
