//! LLM executor trait: The abstraction over model backends.
//!
//! An executor knows how to send a prompt to a model and return the response
//! messages: assistant text, one or more tool-call requests, or both.
//! Provider HTTP clients live outside this workspace and implement this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LlmError;
use crate::message::Message;
use crate::tool::ToolDescriptor;

/// A capability a model may or may not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmCapability {
    Completion,
    Tools,
    Streaming,
    Temperature,
}

impl std::fmt::Display for LlmCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completion => write!(f, "completion"),
            Self::Tools => write!(f, "tools"),
            Self::Streaming => write!(f, "streaming"),
            Self::Temperature => write!(f, "temperature"),
        }
    }
}

/// A model identity plus the capabilities it advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmModel {
    /// Provider name (e.g., "openai", "anthropic", "ollama")
    pub provider: String,

    /// Model identifier as the provider knows it
    pub id: String,

    #[serde(default)]
    pub capabilities: Vec<LlmCapability>,
}

impl LlmModel {
    pub fn new(provider: impl Into<String>, id: impl Into<String>, capabilities: Vec<LlmCapability>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
            capabilities,
        }
    }

    pub fn supports(&self, capability: LlmCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Fail with [`LlmError::MissingCapability`] unless the model supports `capability`.
    pub fn require(&self, capability: LlmCapability) -> Result<(), LlmError> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(LlmError::MissingCapability {
                model: self.id.clone(),
                capability: capability.to_string(),
            })
        }
    }
}

/// Sampling parameters sent alongside a prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// The messages and parameters for one executor call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub params: LlmParams,
}

impl Prompt {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages,
            params: LlmParams::default(),
        }
    }

    pub fn with_params(mut self, params: LlmParams) -> Self {
        self.params = params;
        self
    }
}

/// The core executor trait.
///
/// The engine calls `execute()` without knowing which backend is used.
#[async_trait]
pub trait LlmExecutor: Send + Sync {
    /// A human-readable name for this executor (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Send a prompt and get the complete list of response messages.
    async fn execute(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
        tools: &[ToolDescriptor],
    ) -> std::result::Result<Vec<Message>, LlmError>;

    /// Send a prompt and receive the response as a finite stream of text fragments.
    ///
    /// Default implementation calls `execute()` and forwards the assistant text
    /// as a single fragment.
    async fn execute_streaming(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<String, LlmError>>,
        LlmError,
    > {
        let responses = self.execute(prompt, model, &[]).await?;
        let text: String = responses
            .iter()
            .filter(|m| matches!(m, Message::Assistant { .. }))
            .map(|m| m.content())
            .collect();
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(Ok(text)).await;
        Ok(rx)
    }
}
