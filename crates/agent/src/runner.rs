//! The agent runner: one configured engine instance.
//!
//! An [`Agent`] binds a strategy to an LLM executor, a model, a tool
//! registry and a set of installed features. Every call to [`Agent::run`]
//! gets a fresh [`AgentContext`]; runs share nothing mutable except what the
//! features themselves keep (e.g. checkpoint storage).

use std::sync::Arc;
use tracing::{info, warn};
use weft_core::agent::AgentConfig;
use weft_core::llm::{LlmCapability, LlmExecutor, LlmModel};
use weft_core::tool::{Tool, ToolRegistry};

use crate::context::{AgentContext, FeatureSet};
use crate::error::AgentError;
use crate::feature::Feature;
use crate::pipeline::{AgentFinished, AgentRunError, AgentStarting, Pipeline};
use crate::strategy::Strategy;
use crate::value::NodeValue;

pub struct Agent {
    id: String,
    strategy: Arc<Strategy>,
    executor: Arc<dyn LlmExecutor>,
    model: LlmModel,
    tools: Arc<ToolRegistry>,
    pipeline: Arc<Pipeline>,
    features: FeatureSet,
    config: AgentConfig,
}

impl Agent {
    pub fn builder(executor: Arc<dyn LlmExecutor>, model: LlmModel) -> AgentBuilder {
        AgentBuilder {
            id: None,
            strategy: None,
            executor,
            model,
            tools: ToolRegistry::new(),
            pipeline: Pipeline::new(),
            features: FeatureSet::default(),
            config: AgentConfig::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// The installed instance of feature `F`.
    pub fn feature<F: Feature>(&self) -> Result<Arc<F>, AgentError> {
        self.features.get::<F>(F::KEY)
    }

    /// A fresh context for one run.
    pub fn new_context(&self) -> AgentContext {
        AgentContext::new(self.id.clone(), Arc::clone(&self.executor), self.model.clone())
            .with_tools(Arc::clone(&self.tools))
            .with_pipeline(Arc::clone(&self.pipeline))
            .with_features(self.features.clone())
            .with_config(self.config.clone())
    }

    /// Run the strategy once.
    ///
    /// Fails before anything runs if tools are registered but the model
    /// cannot call them. Errors from the strategy fire `AgentRunError` and
    /// are then returned unchanged.
    pub async fn run(&self, input: impl Into<NodeValue>) -> Result<NodeValue, AgentError> {
        let mut ctx = self.new_context();
        self.run_in(&mut ctx, input.into()).await
    }

    /// Run the strategy in a caller-provided context, with the same model
    /// checks as [`run`](Self::run).
    pub async fn run_in(&self, ctx: &mut AgentContext, input: NodeValue) -> Result<NodeValue, AgentError> {
        if !self.tools.is_empty() {
            self.model.require(LlmCapability::Tools)?;
        }

        let run_id = ctx.run_id().to_string();
        info!(agent_id = %self.id, run_id = %run_id, strategy = %self.strategy.name(), "Agent run started");

        match self.drive(ctx, input).await {
            Ok(result) => {
                info!(agent_id = %self.id, run_id = %run_id, "Agent run finished");
                Ok(result)
            }
            Err(e) => {
                warn!(agent_id = %self.id, run_id = %run_id, error = %e, "Agent run failed");
                let event = AgentRunError {
                    agent_id: self.id.clone(),
                    run_id,
                    error: e.to_string(),
                };
                if let Err(hook_err) = self.pipeline.fire(ctx, &event).await {
                    warn!(error = %hook_err, "Run error handler failed");
                }
                Err(e)
            }
        }
    }

    async fn drive(&self, ctx: &mut AgentContext, input: NodeValue) -> Result<NodeValue, AgentError> {
        let starting = AgentStarting {
            agent_id: self.id.clone(),
            run_id: ctx.run_id().to_string(),
            input: input.clone(),
        };
        self.pipeline.fire(ctx, &starting).await?;

        let result = self.strategy.execute(ctx, input).await?;

        let finished = AgentFinished {
            agent_id: self.id.clone(),
            run_id: ctx.run_id().to_string(),
            result: result.clone(),
        };
        self.pipeline.fire(ctx, &finished).await?;
        Ok(result)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("strategy", &self.strategy.name())
            .field("model", &self.model.id)
            .field("tools", &self.tools.names())
            .field("features", &self.features.keys())
            .finish()
    }
}

pub struct AgentBuilder {
    id: Option<String>,
    strategy: Option<Strategy>,
    executor: Arc<dyn LlmExecutor>,
    model: LlmModel,
    tools: ToolRegistry,
    pipeline: Pipeline,
    features: FeatureSet,
    config: AgentConfig,
}

impl AgentBuilder {
    /// Agent id; checkpoints are grouped by it. Defaults to a random UUID.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Register a single tool. Fails on a duplicate name.
    pub fn tool<T: Tool>(mut self, tool: T) -> Result<Self, AgentError> {
        self.tools.register(tool)?;
        Ok(self)
    }

    /// Install a feature with its default configuration adjusted by `configure`.
    ///
    /// Installing the same feature twice is a configuration error.
    pub fn install<F: Feature>(mut self, configure: impl FnOnce(&mut F::Config)) -> Result<Self, AgentError> {
        if self.features.contains(F::KEY) {
            return Err(AgentError::Configuration(format!(
                "feature `{}` is already installed",
                F::KEY
            )));
        }
        let mut config = F::Config::default();
        configure(&mut config);
        let feature = F::install(config, &mut self.pipeline)?;
        self.features.insert(F::KEY, feature);
        Ok(self)
    }

    /// Direct access to the pipeline, for ad-hoc handlers.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let strategy = match self.strategy {
            Some(s) => s,
            None => crate::strategy::single_run::single_run_strategy()?,
        };
        Ok(Agent {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            strategy: Arc::new(strategy),
            executor: self.executor,
            model: self.model,
            tools: Arc::new(self.tools),
            pipeline: Arc::new(self.pipeline),
            features: self.features,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_helpers::*;
    use crate::pipeline::{ToolCallCompleted, ToolCallFailed, ToolCallStarted};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use weft_core::error::{LlmError, ToolError};
    use weft_core::message::Message;
    use weft_core::tool::{Tool, ToolDescriptor, ToolParameter, ToolParameterType, ToolPermit};

    struct CountingFeature {
        starts: Mutex<usize>,
    }

    impl Feature for CountingFeature {
        type Config = ();
        const KEY: &'static str = "counting";

        fn install(_config: (), pipeline: &mut Pipeline) -> Result<Arc<Self>, AgentError> {
            let feature = Arc::new(Self { starts: Mutex::new(0) });
            let f = Arc::clone(&feature);
            pipeline.intercept::<AgentStarting, _>(move |_ctx, _event| {
                let f = Arc::clone(&f);
                Box::pin(async move {
                    *f.starts.lock().unwrap() += 1;
                    Ok(())
                })
            });
            Ok(feature)
        }
    }

    #[tokio::test]
    async fn simple_text_response() {
        let agent = Agent::builder(Arc::new(ScriptedExecutor::single_text("Hello!")), test_model())
            .id("greeter")
            .build()
            .unwrap();

        let result = agent.run("Hi").await.unwrap();
        assert_eq!(result, NodeValue::text("Hello!"));
        assert_eq!(agent.id(), "greeter");
    }

    #[tokio::test]
    async fn tools_require_tool_capable_model() {
        let model = LlmModel::new("test", "text-only", vec![LlmCapability::Completion]);
        let executor = Arc::new(ScriptedExecutor::single_text("unused"));
        let agent = Agent::builder(executor.clone(), model)
            .tools(echo_registry())
            .build()
            .unwrap();

        let err = agent.run("Hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::MissingCapability { .. })));
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn run_in_checks_capabilities_too() {
        let model = LlmModel::new("test", "text-only", vec![LlmCapability::Completion]);
        let executor = Arc::new(ScriptedExecutor::single_text("unused"));
        let agent = Agent::builder(executor.clone(), model)
            .tools(echo_registry())
            .build()
            .unwrap();

        let mut ctx = agent.new_context();
        let err = agent.run_in(&mut ctx, NodeValue::text("Hi")).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::MissingCapability { .. })));
        assert_eq!(executor.call_count(), 0);
        assert!(ctx.history().is_empty());
    }

    struct SlowTool {
        finished: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        type Args = EchoArgs;
        type Output = String;

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("slow", "Takes a minute").required(ToolParameter::new(
                "text",
                "Text to return",
                ToolParameterType::String,
            ))
        }

        async fn execute(&self, args: EchoArgs, _permit: &ToolPermit) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(args.text)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_run_cancels_its_tool_calls() {
        let finished = Arc::new(AtomicBool::new(false));
        let started = Arc::new(Mutex::new(0));
        let executor = Arc::new(ScriptedExecutor::new(vec![
            vec![make_tool_call("slow", serde_json::json!({"text": "late"}))],
            vec![Message::assistant("never reached")],
        ]));
        let mut builder = Agent::builder(executor.clone(), test_model())
            .tool(SlowTool { finished: finished.clone() })
            .unwrap();
        let s = started.clone();
        builder
            .pipeline_mut()
            .observe::<ToolCallStarted, _>(move |_ev| *s.lock().unwrap() += 1);
        let agent = builder.build().unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), agent.run("go")).await;
        assert!(outcome.is_err(), "run should still be waiting on the tool");
        assert_eq!(*started.lock().unwrap(), 1);

        // Well past the tool's own deadline: the dropped call never resumes.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn features_are_reachable_and_unique() {
        let agent = Agent::builder(Arc::new(ScriptedExecutor::new(vec![
            vec![Message::assistant("one")],
            vec![Message::assistant("two")],
        ])), test_model())
        .install::<CountingFeature>(|_| {})
        .unwrap()
        .build()
        .unwrap();

        agent.run("a").await.unwrap();
        agent.run("b").await.unwrap();
        assert_eq!(*agent.feature::<CountingFeature>().unwrap().starts.lock().unwrap(), 2);

        let duplicate = Agent::builder(Arc::new(ScriptedExecutor::new(vec![])), test_model())
            .install::<CountingFeature>(|_| {})
            .unwrap()
            .install::<CountingFeature>(|_| {});
        assert!(matches!(duplicate, Err(AgentError::Configuration(_))));
    }

    #[tokio::test]
    async fn run_errors_fire_hook_and_propagate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut builder = Agent::builder(
            Arc::new(ScriptedExecutor::failing(LlmError::RateLimited { retry_after_secs: 3 })),
            test_model(),
        );
        let s = seen.clone();
        builder.pipeline_mut().intercept::<AgentRunError, _>(move |_ctx, event| {
            let s = s.clone();
            Box::pin(async move {
                s.lock().unwrap().push(event.error.clone());
                Ok(())
            })
        });
        let agent = builder.build().unwrap();

        let err = agent.run("Hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::RateLimited { .. })));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(seen.lock().unwrap()[0].contains("Rate limited"));
    }

    #[tokio::test]
    async fn tool_batch_failures_are_isolated_inside_a_run() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let executor = Arc::new(ScriptedExecutor::new(vec![
            vec![
                Message::tool_call(Some("1".into()), "echo", &serde_json::json!({"text": "one"})),
                Message::tool_call(Some("2".into()), "echo", &serde_json::json!({"text": "fail"})),
                Message::tool_call(Some("3".into()), "echo", &serde_json::json!({"text": "three"})),
            ],
            vec![Message::assistant("recovered")],
        ]));
        let mut builder = Agent::builder(executor.clone(), test_model()).tool(EchoTool).unwrap();
        let e = events.clone();
        builder
            .pipeline_mut()
            .observe::<ToolCallStarted, _>(move |ev| e.lock().unwrap().push(format!("call:{}", ev.call.args["text"])));
        let e = events.clone();
        builder
            .pipeline_mut()
            .observe::<ToolCallFailed, _>(move |ev| e.lock().unwrap().push(format!("failed:{:?}", ev.call.id)));
        let e = events.clone();
        builder
            .pipeline_mut()
            .observe::<ToolCallCompleted, _>(move |ev| e.lock().unwrap().push(format!("ok:{:?}", ev.call.id)));
        let agent = builder.build().unwrap();

        let result = agent.run("go").await.unwrap();
        assert_eq!(result, NodeValue::text("recovered"));

        // The second prompt carries all three results, in call order.
        let prompt = &executor.prompts()[1];
        let results: Vec<&Message> = prompt
            .messages
            .iter()
            .filter(|m| matches!(m, Message::ToolResult { .. }))
            .collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content(), "one");
        assert!(results[1].content().contains("asked to fail"));
        assert_eq!(results[2].content(), "three");

        let events = events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| e.starts_with("call:")).count(), 3);
        assert!(events.contains(&"failed:Some(\"2\")".to_string()));
        assert_eq!(events.iter().filter(|e| e.starts_with("ok:")).count(), 2);
    }
}
