//! Message domain types.
//!
//! Messages are the values that flow through a run: the agent's history is an
//! ordered list of them, the LLM executor consumes and produces them, and
//! checkpoints persist them verbatim.
//!
//! A message is a tagged union keyed by `role`, so the serialized form always
//! carries an explicit discriminant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// Assistant text
    Assistant,
    /// A tool invocation requested by the assistant
    ToolCall,
    /// The outcome of a tool invocation
    ToolResult,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// Metadata attached to every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Token count reported by the executor, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl MessageMeta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            total_tokens: None,
        }
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            total_tokens: None,
        }
    }
}

impl Default for MessageMeta {
    fn default() -> Self {
        Self::now()
    }
}

/// A single message in an agent's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
        meta: MessageMeta,
    },
    User {
        content: String,
        meta: MessageMeta,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        meta: MessageMeta,
    },
    ToolCall {
        /// Provider-assigned call id; absent for some providers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        tool: String,
        /// Arguments as a JSON string
        content: String,
        meta: MessageMeta,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        tool: String,
        content: String,
        meta: MessageMeta,
    },
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
            meta: MessageMeta::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
            meta: MessageMeta::now(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            finish_reason: None,
            meta: MessageMeta::now(),
        }
    }

    /// Create a tool-call request message.
    pub fn tool_call(id: Option<String>, tool: impl Into<String>, arguments: &serde_json::Value) -> Self {
        Self::ToolCall {
            id,
            tool: tool.into(),
            content: arguments.to_string(),
            meta: MessageMeta::now(),
        }
    }

    /// Create a tool result message.
    pub fn tool_result(id: Option<String>, tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            id,
            tool: tool.into(),
            content: content.into(),
            meta: MessageMeta::now(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::ToolCall { .. } => Role::ToolCall,
            Self::ToolResult { .. } => Role::ToolResult,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::ToolCall { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }

    pub fn meta(&self) -> &MessageMeta {
        match self {
            Self::System { meta, .. }
            | Self::User { meta, .. }
            | Self::Assistant { meta, .. }
            | Self::ToolCall { meta, .. }
            | Self::ToolResult { meta, .. } => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut MessageMeta {
        match self {
            Self::System { meta, .. }
            | Self::User { meta, .. }
            | Self::Assistant { meta, .. }
            | Self::ToolCall { meta, .. }
            | Self::ToolResult { meta, .. } => meta,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.meta().timestamp
    }

    /// Replace the timestamp (used when replaying stored histories).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.meta_mut().timestamp = timestamp;
        self
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }
}

/// Stable sort of a history by each message's own timestamp.
///
/// Messages sharing a timestamp keep their relative order.
pub fn sort_by_timestamp(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp());
}

/// Rough token estimate for a history (4 chars ≈ 1 token).
pub fn estimated_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.content().len() / 4).sum()
}
