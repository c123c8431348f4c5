//! # Weft Core
//!
//! Domain types, traits, and error definitions for the Weft agent engine.
//! This crate defines the model every other crate implements against:
//! messages, the LLM executor contract, tools and their dispatch environment,
//! and checkpoint storage.
//!
//! ## Design Philosophy
//!
//! Every pluggable subsystem is a trait here; implementations live in their
//! respective crates. Tool execution is the exception: tools can only run
//! through [`ToolEnvironment`], which alone can mint the [`ToolPermit`] a
//! tool body requires.

pub mod agent;
pub mod checkpoint;
pub mod environment;
pub mod error;
pub mod llm;
pub mod message;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::AgentConfig;
pub use checkpoint::{AgentCheckpointData, CheckpointStorage, TOMBSTONE_NODE_ID};
pub use environment::{NoopObserver, ToolEnvironment, ToolObserver};
pub use error::{Error, LlmError, PersistenceError, Result, ToolError};
pub use llm::{LlmCapability, LlmExecutor, LlmModel, LlmParams, Prompt};
pub use message::{Message, MessageMeta, Role};
pub use tool::{
    Tool, ToolCall, ToolDescriptor, ToolOutcome, ToolParameter, ToolParameterType, ToolPermit, ToolRegistry,
    ToolResult,
};
