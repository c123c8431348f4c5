//! Error types for the weft domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for core operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- LLM executor errors ---
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Persistence errors ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Model {model} does not support {capability}")]
    MissingCapability { model: String, capability: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Executor not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Empty response from {0}")]
    EmptyResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    Duplicate(String),

    /// The arguments could not be decoded against the tool's declared schema.
    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    /// The tool itself rejected its (well-formed) arguments.
    #[error("Validation failed for {tool_name}: {reason}")]
    Validation { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Failed to encode result of {tool_name}: {reason}")]
    Encoding { tool_name: String, reason: String },
}

impl ToolError {
    /// Whether this error is an argument or validation problem rather
    /// than an unexpected failure inside the tool body.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidArguments { .. } | Self::Validation { .. })
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Checkpoint write failed for {checkpoint_id}: {reason}")]
    WriteFailed { checkpoint_id: String, reason: String },

    #[error("Corrupt checkpoint {location}: {reason}")]
    Corrupt { location: String, reason: String },

    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_error_displays_correctly() {
        let err = Error::Llm(LlmError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_classification() {
        let invalid = ToolError::InvalidArguments {
            tool_name: "ask_user".into(),
            reason: "missing field `message`".into(),
        };
        let failed = ToolError::ExecutionFailed {
            tool_name: "ask_user".into(),
            reason: "stdin closed".into(),
        };
        assert!(invalid.is_validation());
        assert!(!failed.is_validation());
        assert!(failed.to_string().contains("stdin closed"));
    }

    #[test]
    fn persistence_error_wraps_into_top_level() {
        let err: Error = PersistenceError::WriteFailed {
            checkpoint_id: "cp-1".into(),
            reason: "disk full".into(),
        }
        .into();
        assert!(err.to_string().contains("cp-1"));
        assert!(err.to_string().contains("disk full"));
    }
}
