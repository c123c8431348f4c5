//! Shared test helpers: a scripted LLM executor and small fixtures.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use weft_core::error::{LlmError, ToolError};
use weft_core::llm::{LlmCapability, LlmExecutor, LlmModel, Prompt};
use weft_core::message::Message;
use weft_core::tool::{Tool, ToolDescriptor, ToolParameter, ToolParameterType, ToolPermit, ToolRegistry};

use crate::context::AgentContext;

/// An executor that replays a script of responses, one entry per call.
///
/// Each call to `execute` returns the next entry. Running past the end of
/// the script yields [`LlmError::EmptyResponse`].
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<Result<Vec<Message>, LlmError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<Vec<Message>>) -> Self {
        Self {
            responses: Mutex::new(script.into_iter().map(Ok).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// An executor that answers its first call with a single text.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![vec![Message::assistant(text)]])
    }

    /// An executor whose first call fails.
    pub fn failing(error: LlmError) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(error)])),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        prompt: &Prompt,
        _model: &LlmModel,
        _tools: &[weft_core::tool::ToolDescriptor],
    ) -> Result<Vec<Message>, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
        let next = self.responses.lock().ok().and_then(|mut r| r.pop_front());
        next.unwrap_or_else(|| Err(LlmError::EmptyResponse("scripted executor ran out of responses".into())))
    }
}

/// A model that supports completion and tools.
pub fn test_model() -> LlmModel {
    LlmModel::new(
        "test",
        "scripted-model",
        vec![LlmCapability::Completion, LlmCapability::Tools],
    )
}

/// A context backed by a scripted executor and no tools.
pub fn test_context(script: Vec<Vec<Message>>) -> AgentContext {
    AgentContext::new("test-agent", Arc::new(ScriptedExecutor::new(script)), test_model())
}

pub fn context_with(executor: Arc<ScriptedExecutor>, tools: ToolRegistry) -> AgentContext {
    AgentContext::new("test-agent", executor, test_model()).with_tools(Arc::new(tools))
}

/// A tool-call message with id `call_<name>`.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> Message {
    Message::tool_call(Some(format!("call_{name}")), name, &args)
}

#[derive(Deserialize)]
pub struct EchoArgs {
    pub text: String,
}

/// Echoes its `text` argument; fails when the text is `"fail"`.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    type Args = EchoArgs;
    type Output = String;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("echo", "Echoes back the input").required(ToolParameter::new(
            "text",
            "Text to echo",
            ToolParameterType::String,
        ))
    }

    async fn execute(&self, args: EchoArgs, _permit: &ToolPermit) -> Result<String, ToolError> {
        if args.text == "fail" {
            return Err(ToolError::ExecutionFailed {
                tool_name: "echo".into(),
                reason: "asked to fail".into(),
            });
        }
        Ok(args.text)
    }
}

pub fn echo_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if let Err(e) = registry.register(EchoTool) {
        tracing::warn!(error = %e, "echo tool registration failed");
    }
    registry
}
