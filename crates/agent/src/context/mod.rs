//! Per-run execution state.
//!
//! An [`AgentContext`] is created for each run and owned by it. It holds the
//! message history, the execution pointer (current node and its input), the
//! LLM executor and tool registry the run talks to, and typed storage for
//! nodes and installed features.

pub mod storage;

pub use storage::{ContextStorage, FeatureSet, StorageKey};

use std::sync::Arc;
use tracing::debug;
use weft_core::agent::AgentConfig;
use weft_core::environment::ToolEnvironment;
use weft_core::llm::{LlmExecutor, LlmModel, Prompt};
use weft_core::message::{self, Message};
use weft_core::tool::{ToolCall, ToolRegistry, ToolResult};

use crate::error::AgentError;
use crate::feature::Feature;
use crate::pipeline::{AfterLlmCall, BeforeLlmCall, Pipeline, PipelineToolObserver};
use crate::value::NodeValue;

/// A node to run next, together with its input.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPoint {
    pub node_id: String,
    pub input: NodeValue,
}

impl ExecutionPoint {
    pub fn new(node_id: impl Into<String>, input: NodeValue) -> Self {
        Self {
            node_id: node_id.into(),
            input,
        }
    }
}

pub struct AgentContext {
    agent_id: String,
    run_id: String,
    history: Vec<Message>,
    current_node_id: Option<String>,
    last_input: Option<NodeValue>,
    /// Set by features or nodes to redirect the run.
    pending_point: Option<ExecutionPoint>,
    executor: Arc<dyn LlmExecutor>,
    model: LlmModel,
    tools: Arc<ToolRegistry>,
    pipeline: Arc<Pipeline>,
    config: AgentConfig,
    features: FeatureSet,
    storage: ContextStorage,
}

impl AgentContext {
    pub fn new(agent_id: impl Into<String>, executor: Arc<dyn LlmExecutor>, model: LlmModel) -> Self {
        Self {
            agent_id: agent_id.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            history: Vec::new(),
            current_node_id: None,
            last_input: None,
            pending_point: None,
            executor,
            model,
            tools: Arc::new(ToolRegistry::new()),
            pipeline: Arc::new(Pipeline::new()),
            config: AgentConfig::default(),
            features: FeatureSet::default(),
            storage: ContextStorage::default(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_pipeline(mut self, pipeline: Arc<Pipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    /// Apply run configuration; a configured system prompt seeds the history.
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        if let Some(prompt) = &config.system_prompt {
            self.history.insert(0, Message::system(prompt));
        }
        self.config = config;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn model(&self) -> &LlmModel {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    // ── History ──

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn append(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn replace_history(&mut self, history: Vec<Message>) {
        self.history = history;
    }

    // ── Execution pointer ──

    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    pub fn last_input(&self) -> Option<&NodeValue> {
        self.last_input.as_ref()
    }

    /// Record the node about to run. Called by the engine before "before node" fires.
    pub(crate) fn enter_node(&mut self, node_id: &str, input: &NodeValue) {
        self.current_node_id = Some(node_id.to_string());
        self.last_input = Some(input.clone());
    }

    /// Overwrite history and execution pointer in one step.
    ///
    /// The history is re-sorted by each message's own timestamp. The run
    /// continues from `node_id` with `input`: immediately when called before
    /// the strategy starts, or after the current node completes.
    pub fn set_execution_point(&mut self, node_id: impl Into<String>, history: Vec<Message>, input: NodeValue) {
        let node_id = node_id.into();
        debug!(agent_id = %self.agent_id, node = %node_id, messages = history.len(), "Setting execution point");
        self.history = history;
        message::sort_by_timestamp(&mut self.history);
        self.current_node_id = Some(node_id.clone());
        self.last_input = Some(input.clone());
        self.pending_point = Some(ExecutionPoint { node_id, input });
    }

    pub(crate) fn take_execution_point(&mut self) -> Option<ExecutionPoint> {
        self.pending_point.take()
    }

    // ── Storage ──

    pub fn store<T: std::any::Any + Send + Sync>(&mut self, key: StorageKey<T>, value: T) {
        self.storage.insert(key, value);
    }

    pub fn get<T: std::any::Any + Send + Sync>(&self, key: StorageKey<T>) -> Result<&T, AgentError> {
        self.storage.get(key)
    }

    pub fn get_mut<T: std::any::Any + Send + Sync>(&mut self, key: StorageKey<T>) -> Result<&mut T, AgentError> {
        self.storage.get_mut(key)
    }

    pub fn storage(&self) -> &ContextStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut ContextStorage {
        &mut self.storage
    }

    /// The installed instance of feature `F`.
    pub fn feature<F: Feature>(&self) -> Result<Arc<F>, AgentError> {
        self.features.get::<F>(F::KEY)
    }

    // ── LLM and tools ──

    /// Send the current history to the LLM and append its responses.
    pub async fn request_llm(&mut self) -> Result<Vec<Message>, AgentError> {
        let tools = self.tools.descriptors();
        let prompt = Prompt::new(self.history.clone()).with_params(self.config.params.clone());
        let pipeline = self.pipeline();

        let before = BeforeLlmCall {
            prompt: prompt.clone(),
            model: self.model.clone(),
            tools: tools.clone(),
        };
        pipeline.fire(self, &before).await?;

        debug!(
            run_id = %self.run_id,
            executor = self.executor.name(),
            model = %self.model.id,
            messages = prompt.messages.len(),
            "Requesting LLM"
        );
        let responses = self.executor.execute(&prompt, &self.model, &tools).await?;
        self.history.extend(responses.iter().cloned());

        let after = AfterLlmCall {
            prompt,
            model: self.model.clone(),
            responses: responses.clone(),
        };
        pipeline.fire(self, &after).await?;
        Ok(responses)
    }

    /// Stream the assistant's reply to the current history.
    ///
    /// Streamed text is not appended to the history.
    pub async fn request_llm_streaming(
        &self,
    ) -> Result<tokio_stream::wrappers::ReceiverStream<Result<String, weft_core::LlmError>>, AgentError> {
        let prompt = Prompt::new(self.history.clone()).with_params(self.config.params.clone());
        let rx = self.executor.execute_streaming(&prompt, &self.model).await?;
        Ok(tokio_stream::wrappers::ReceiverStream::new(rx))
    }

    /// Dispatch a batch of tool calls through the tool environment.
    ///
    /// Results are in input order. Results are not appended to the history.
    pub async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let environment = ToolEnvironment::new(Arc::clone(&self.tools)).with_observer(Arc::new(PipelineToolObserver {
            pipeline: self.pipeline(),
            run_id: self.run_id.clone(),
        }));
        environment.execute_tools(calls).await
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("agent_id", &self.agent_id)
            .field("run_id", &self.run_id)
            .field("messages", &self.history.len())
            .field("current_node_id", &self.current_node_id)
            .field("features", &self.features.keys())
            .finish_non_exhaustive()
    }
}
