//! Pipeline: The interception bus features subscribe to.
//!
//! Each event kind has its own explicit, ordered handler list. Firing an
//! event runs its handlers one after another, in registration order, on the
//! caller's task. A failing handler stops the sequence and its error is
//! returned to whoever fired the event.
//!
//! Two families of events exist:
//!
//! - **Context events** (agent, strategy, node and LLM lifecycle) get mutable
//!   access to the [`AgentContext`] and may suspend, e.g. to read or write
//!   checkpoints.
//! - **Tool events** are observed synchronously from inside the tool
//!   environment while a batch is in flight, so they only see the event.

use futures::future::BoxFuture;
use std::sync::Arc;
use weft_core::environment::ToolObserver;
use weft_core::llm::{LlmModel, Prompt};
use weft_core::message::Message;
use weft_core::tool::{ToolCall, ToolDescriptor, ToolResult};

use crate::context::{AgentContext, ExecutionPoint};
use crate::error::AgentError;
use crate::value::NodeValue;

/// A handler for a context event.
pub type ContextHandler<E> =
    Arc<dyn for<'a> Fn(&'a mut AgentContext, &'a E) -> BoxFuture<'a, Result<(), AgentError>> + Send + Sync>;

/// A handler for a tool event.
pub type ToolHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;

// ── Events ────────────────────────────────────────────────────────────────

/// Fired before the strategy starts; the run's context is fresh.
#[derive(Debug, Clone)]
pub struct AgentStarting {
    pub agent_id: String,
    pub run_id: String,
    pub input: NodeValue,
}

#[derive(Debug, Clone)]
pub struct AgentFinished {
    pub agent_id: String,
    pub run_id: String,
    pub result: NodeValue,
}

/// Fired when a run fails, before the error is returned to the caller.
#[derive(Debug, Clone)]
pub struct AgentRunError {
    pub agent_id: String,
    pub run_id: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct StrategyStarted {
    pub strategy: String,
}

#[derive(Debug, Clone)]
pub struct StrategyFinished {
    pub strategy: String,
    pub result: NodeValue,
}

#[derive(Debug, Clone)]
pub struct BeforeNode {
    pub node: String,
    pub input: NodeValue,
}

/// Fired once a node has returned and its successor is resolved.
#[derive(Debug, Clone)]
pub struct AfterNode {
    pub node: String,
    pub input: NodeValue,
    pub output: NodeValue,
    /// Where the run continues: the successor node and its input.
    pub next: ExecutionPoint,
}

#[derive(Debug, Clone)]
pub struct NodeExecutionError {
    pub node: String,
    pub input: NodeValue,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct BeforeLlmCall {
    pub prompt: Prompt,
    pub model: LlmModel,
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone)]
pub struct AfterLlmCall {
    pub prompt: Prompt,
    pub model: LlmModel,
    pub responses: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct ToolCallStarted {
    pub run_id: String,
    pub call: ToolCall,
}

#[derive(Debug, Clone)]
pub struct ToolValidationFailed {
    pub run_id: String,
    pub call: ToolCall,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ToolCallFailed {
    pub run_id: String,
    pub call: ToolCall,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ToolCallCompleted {
    pub run_id: String,
    pub call: ToolCall,
    pub result: ToolResult,
}

// ── Handler lists ─────────────────────────────────────────────────────────

/// An event kind that receives the agent context.
pub trait ContextEvent: Send + Sync + Sized + 'static {
    fn handlers(pipeline: &Pipeline) -> &[ContextHandler<Self>];
    fn handlers_mut(pipeline: &mut Pipeline) -> &mut Vec<ContextHandler<Self>>;
}

/// An event kind observed from inside the tool environment.
pub trait ToolEvent: Send + Sync + Sized + 'static {
    fn handlers(pipeline: &Pipeline) -> &[ToolHandler<Self>];
    fn handlers_mut(pipeline: &mut Pipeline) -> &mut Vec<ToolHandler<Self>>;
}

macro_rules! pipeline {
    (
        context { $($cevent:ident => $cfield:ident),* $(,)? }
        tool { $($tevent:ident => $tfield:ident),* $(,)? }
    ) => {
        /// Ordered handler lists, one per event kind.
        #[derive(Default)]
        pub struct Pipeline {
            $($cfield: Vec<ContextHandler<$cevent>>,)*
            $($tfield: Vec<ToolHandler<$tevent>>,)*
        }

        $(
            impl ContextEvent for $cevent {
                fn handlers(pipeline: &Pipeline) -> &[ContextHandler<Self>] {
                    &pipeline.$cfield
                }
                fn handlers_mut(pipeline: &mut Pipeline) -> &mut Vec<ContextHandler<Self>> {
                    &mut pipeline.$cfield
                }
            }
        )*

        $(
            impl ToolEvent for $tevent {
                fn handlers(pipeline: &Pipeline) -> &[ToolHandler<Self>] {
                    &pipeline.$tfield
                }
                fn handlers_mut(pipeline: &mut Pipeline) -> &mut Vec<ToolHandler<Self>> {
                    &mut pipeline.$tfield
                }
            }
        )*

        impl Pipeline {
            /// Total number of registered handlers across all events.
            pub fn handler_count(&self) -> usize {
                0 $(+ self.$cfield.len())* $(+ self.$tfield.len())*
            }
        }
    };
}

pipeline! {
    context {
        AgentStarting => agent_starting,
        AgentFinished => agent_finished,
        AgentRunError => agent_run_error,
        StrategyStarted => strategy_started,
        StrategyFinished => strategy_finished,
        BeforeNode => before_node,
        AfterNode => after_node,
        NodeExecutionError => node_execution_error,
        BeforeLlmCall => before_llm_call,
        AfterLlmCall => after_llm_call,
    }
    tool {
        ToolCallStarted => tool_call,
        ToolValidationFailed => tool_validation_error,
        ToolCallFailed => tool_call_failure,
        ToolCallCompleted => tool_call_result,
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context-event handler.
    ///
    /// ```ignore
    /// pipeline.intercept::<BeforeNode, _>(|ctx, event| Box::pin(async move {
    ///     tracing::info!(node = %event.node, "entering");
    ///     Ok(())
    /// }));
    /// ```
    pub fn intercept<E, F>(&mut self, handler: F)
    where
        E: ContextEvent,
        F: for<'a> Fn(&'a mut AgentContext, &'a E) -> BoxFuture<'a, Result<(), AgentError>> + Send + Sync + 'static,
    {
        E::handlers_mut(self).push(Arc::new(handler));
    }

    /// Register a tool-event handler.
    pub fn observe<E, F>(&mut self, handler: F)
    where
        E: ToolEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        E::handlers_mut(self).push(Arc::new(handler));
    }

    /// Run every handler for `event` in registration order.
    pub async fn fire<E: ContextEvent>(&self, ctx: &mut AgentContext, event: &E) -> Result<(), AgentError> {
        for handler in E::handlers(self) {
            handler(&mut *ctx, event).await?;
        }
        Ok(())
    }

    pub fn fire_tool<E: ToolEvent>(&self, event: &E) {
        for handler in E::handlers(self) {
            handler(event);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Forwards tool-environment callbacks into the pipeline's tool events.
pub(crate) struct PipelineToolObserver {
    pub(crate) pipeline: Arc<Pipeline>,
    pub(crate) run_id: String,
}

impl ToolObserver for PipelineToolObserver {
    fn on_tool_call(&self, call: &ToolCall) {
        self.pipeline.fire_tool(&ToolCallStarted {
            run_id: self.run_id.clone(),
            call: call.clone(),
        });
    }

    fn on_tool_validation_error(&self, call: &ToolCall, error: &str) {
        self.pipeline.fire_tool(&ToolValidationFailed {
            run_id: self.run_id.clone(),
            call: call.clone(),
            error: error.to_string(),
        });
    }

    fn on_tool_call_failure(&self, call: &ToolCall, error: &str) {
        self.pipeline.fire_tool(&ToolCallFailed {
            run_id: self.run_id.clone(),
            call: call.clone(),
            error: error.to_string(),
        });
    }

    fn on_tool_call_result(&self, call: &ToolCall, result: &ToolResult) {
        self.pipeline.fire_tool(&ToolCallCompleted {
            run_id: self.run_id.clone(),
            call: call.clone(),
            result: result.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_helpers::test_context;
    use std::sync::Mutex;

    #[tokio::test]
    async fn handlers_fire_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        for tag in ["first", "second", "third"] {
            let log = log.clone();
            pipeline.intercept::<BeforeNode, _>(move |_ctx, event| {
                let log = log.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(format!("{tag}:{}", event.node));
                    Ok(())
                })
            });
        }

        let mut ctx = test_context(vec![]);
        let event = BeforeNode {
            node: "A".into(),
            input: NodeValue::Unit,
        };
        pipeline.fire(&mut ctx, &event).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first:A", "second:A", "third:A"]);
        assert_eq!(pipeline.handler_count(), 3);
    }

    #[tokio::test]
    async fn failing_handler_surfaces_and_stops_the_chain() {
        let reached = Arc::new(Mutex::new(false));
        let mut pipeline = Pipeline::new();
        pipeline.intercept::<StrategyStarted, _>(|_ctx, _event| {
            Box::pin(async move { Err(AgentError::Configuration("refused".into())) })
        });
        let flag = reached.clone();
        pipeline.intercept::<StrategyStarted, _>(move |_ctx, _event| {
            let flag = flag.clone();
            Box::pin(async move {
                *flag.lock().unwrap() = true;
                Ok(())
            })
        });

        let mut ctx = test_context(vec![]);
        let err = pipeline
            .fire(&mut ctx, &StrategyStarted { strategy: "s".into() })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("refused"));
        assert!(!*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn context_handlers_may_mutate_the_context() {
        let mut pipeline = Pipeline::new();
        pipeline.intercept::<AgentStarting, _>(|ctx, event| {
            Box::pin(async move {
                ctx.append(Message::user(format!("resumed {}", event.run_id)));
                Ok(())
            })
        });

        let mut ctx = test_context(vec![]);
        let event = AgentStarting {
            agent_id: "a".into(),
            run_id: "r1".into(),
            input: NodeValue::Unit,
        };
        pipeline.fire(&mut ctx, &event).await.unwrap();
        assert_eq!(ctx.history().last().unwrap().content(), "resumed r1");
    }

    #[test]
    fn tool_observer_forwards_to_tool_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        let s = seen.clone();
        pipeline.observe::<ToolCallStarted, _>(move |e| s.lock().unwrap().push(format!("call:{}", e.call.tool)));
        let s = seen.clone();
        pipeline.observe::<ToolCallFailed, _>(move |e| s.lock().unwrap().push(format!("failed:{}", e.error)));

        let observer = PipelineToolObserver {
            pipeline: Arc::new(pipeline),
            run_id: "r".into(),
        };
        let call = ToolCall::new(None, "exit", serde_json::json!({}));
        observer.on_tool_call(&call);
        observer.on_tool_call_failure(&call, "boom");
        observer.on_tool_validation_error(&call, "ignored");

        assert_eq!(*seen.lock().unwrap(), vec!["call:exit", "failed:boom"]);
    }
}
