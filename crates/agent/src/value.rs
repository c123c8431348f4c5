//! Values passed between strategy nodes.
//!
//! A node's output becomes its successor's input. Values are a tagged union
//! so that a checkpointed input deserializes back to the same concrete
//! variant it was saved from. `Opaque` carries arbitrary in-process data and
//! is the one variant that cannot be serialized.

use serde::{Deserialize, Serialize, Serializer};
use std::any::Any;
use std::sync::Arc;
use weft_core::message::Message;
use weft_core::tool::{ToolCall, ToolResult};

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NodeValue {
    #[default]
    Unit,
    Text(String),
    Message(Message),
    Messages(Vec<Message>),
    ToolCalls(Vec<ToolCall>),
    ToolResults(Vec<ToolResult>),
    Json(serde_json::Value),
    #[serde(serialize_with = "reject_opaque", skip_deserializing)]
    Opaque(Arc<dyn Any + Send + Sync>),
}

fn reject_opaque<S: Serializer>(_value: &Arc<dyn Any + Send + Sync>, _serializer: S) -> Result<S::Ok, S::Error> {
    Err(serde::ser::Error::custom("opaque node values cannot be serialized"))
}

impl NodeValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Arc::new(value))
    }

    /// Short name of the variant, for error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Text(_) => "text",
            Self::Message(_) => "message",
            Self::Messages(_) => "messages",
            Self::ToolCalls(_) => "tool_calls",
            Self::ToolResults(_) => "tool_results",
            Self::Json(_) => "json",
            Self::Opaque(_) => "opaque",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn downcast_opaque<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Self::Opaque(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Tool calls carried by this value, either directly or inside messages.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        match self {
            Self::ToolCalls(calls) => calls.clone(),
            Self::Message(m) => ToolCall::from_message(m).into_iter().collect(),
            Self::Messages(ms) => ms.iter().filter_map(ToolCall::from_message).collect(),
            _ => Vec::new(),
        }
    }

    /// Text of the last assistant message carried by this value.
    pub fn assistant_text(&self) -> Option<&str> {
        match self {
            Self::Message(m @ Message::Assistant { .. }) => Some(m.content()),
            Self::Messages(ms) => ms
                .iter()
                .rev()
                .find(|m| matches!(m, Message::Assistant { .. }))
                .map(|m| m.content()),
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

impl std::fmt::Debug for NodeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "Unit"),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Message(m) => f.debug_tuple("Message").field(m).finish(),
            Self::Messages(ms) => f.debug_tuple("Messages").field(ms).finish(),
            Self::ToolCalls(c) => f.debug_tuple("ToolCalls").field(c).finish(),
            Self::ToolResults(r) => f.debug_tuple("ToolResults").field(r).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

impl PartialEq for NodeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Message(a), Self::Message(b)) => a == b,
            (Self::Messages(a), Self::Messages(b)) => a == b,
            (Self::ToolCalls(a), Self::ToolCalls(b)) => a == b,
            (Self::ToolResults(a), Self::ToolResults(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<String> for NodeValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for NodeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Message> for NodeValue {
    fn from(m: Message) -> Self {
        Self::Message(m)
    }
}

impl From<serde_json::Value> for NodeValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}
