//! The tracing feature: one trace per agent run in a [`TelemetryEngine`].
//!
//! Spans opened per run:
//!
//! ```text
//! run (agent id)
//!  ├─ node (node name)
//!  │   └─ llm_call (model id)
//!  └─ tool_call (tool name), parented to the node that dispatched it
//! ```
//!
//! Spans are kept open in the feature and recorded into the engine when they
//! close. Tool calls without an id are matched by tool name, so two
//! concurrent id-less calls to the same tool share one slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use weft_agent::error::AgentError;
use weft_agent::feature::Feature;
use weft_agent::pipeline::{
    AfterLlmCall, AfterNode, AgentFinished, AgentRunError, AgentStarting, BeforeLlmCall, BeforeNode,
    NodeExecutionError, Pipeline, ToolCallCompleted, ToolCallFailed, ToolCallStarted, ToolValidationFailed,
};
use weft_core::tool::ToolCall;

use crate::engine::TelemetryEngine;
use crate::model::{Span, SpanKind};

#[derive(Default)]
pub struct TracingConfig {
    /// Engine to record into; a fresh one when unset.
    pub engine: Option<Arc<TelemetryEngine>>,
}

#[derive(Default)]
struct OpenRun {
    trace_id: String,
    root: Option<Span>,
    node: Option<Span>,
    llm: Option<Span>,
    tools: HashMap<String, Span>,
}

pub struct TracingFeature {
    engine: Arc<TelemetryEngine>,
    runs: Mutex<HashMap<String, OpenRun>>,
}

fn tool_key(call: &ToolCall) -> String {
    call.id.clone().unwrap_or_else(|| call.tool.clone())
}

impl TracingFeature {
    pub fn engine(&self) -> &Arc<TelemetryEngine> {
        &self.engine
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<String, OpenRun>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of runs with an open trace.
    pub fn open_runs(&self) -> usize {
        self.runs().len()
    }

    fn record(&self, trace_id: &str, span: Span) {
        if let Err(e) = self.engine.record_span(trace_id, span) {
            tracing::warn!(error = %e, "Dropping span");
        }
    }

    fn start_run(&self, agent_id: &str, run_id: &str) {
        let trace_id = self.engine.start_trace(agent_id, run_id);
        let root = Span::new(SpanKind::Run, agent_id).with_metadata("run_id", run_id);
        self.runs().insert(
            run_id.to_string(),
            OpenRun {
                trace_id,
                root: Some(root),
                ..Default::default()
            },
        );
    }

    fn finish_run(&self, run_id: &str, error: Option<&str>) {
        let Some(mut run) = self.runs().remove(run_id) else {
            return;
        };
        // Whatever is still open failed along with the run.
        let leftovers = run
            .llm
            .take()
            .into_iter()
            .chain(run.node.take())
            .chain(run.tools.drain().map(|(_, span)| span));
        for mut span in leftovers.collect::<Vec<_>>() {
            span.fail(error.unwrap_or("run ended before span closed"));
            self.record(&run.trace_id, span);
        }
        if let Some(mut root) = run.root.take() {
            match error {
                Some(e) => root.fail(e),
                None => root.end(true),
            }
            self.record(&run.trace_id, root);
        }
        if let Err(e) = self.engine.end_trace(&run.trace_id, error.is_none()) {
            tracing::warn!(error = %e, "Trace vanished before it ended");
        }
    }

    /// Apply `f` to the open run, if any.
    fn with_run(&self, run_id: &str, f: impl FnOnce(&mut OpenRun) -> Option<Span>) {
        let (trace_id, closed) = {
            let mut runs = self.runs();
            let Some(run) = runs.get_mut(run_id) else {
                return;
            };
            (run.trace_id.clone(), f(run))
        };
        if let Some(span) = closed {
            self.record(&trace_id, span);
        }
    }

    fn parent_id(run: &OpenRun) -> Option<String> {
        run.node
            .as_ref()
            .or(run.root.as_ref())
            .map(|s| s.id.clone())
    }

    fn open_node(&self, run_id: &str, node: &str) {
        self.with_run(run_id, |run| {
            let mut span = Span::new(SpanKind::Node, node);
            if let Some(root) = &run.root {
                span = span.with_parent(&root.id);
            }
            run.node.replace(span)
        });
    }

    fn close_node(&self, run_id: &str, next: Option<&str>, error: Option<&str>) {
        self.with_run(run_id, |run| {
            let mut span = run.node.take()?;
            if let Some(next) = next {
                span = span.with_metadata("next", next);
            }
            match error {
                Some(e) => span.fail(e),
                None => span.end(true),
            }
            Some(span)
        });
    }

    fn open_llm(&self, run_id: &str, model: &str, messages: usize) {
        self.with_run(run_id, |run| {
            let mut span = Span::new(SpanKind::LlmCall, model).with_metadata("prompt_messages", messages);
            if let Some(parent) = Self::parent_id(run) {
                span = span.with_parent(parent);
            }
            run.llm.replace(span)
        });
    }

    fn close_llm(&self, run_id: &str, responses: usize) {
        self.with_run(run_id, |run| {
            let mut span = run.llm.take()?.with_metadata("responses", responses);
            span.end(true);
            Some(span)
        });
    }

    fn open_tool(&self, run_id: &str, call: &ToolCall) {
        self.with_run(run_id, |run| {
            let mut span = Span::new(SpanKind::ToolCall, &call.tool);
            if let Some(id) = &call.id {
                span = span.with_metadata("call_id", id.as_str());
            }
            if let Some(parent) = Self::parent_id(run) {
                span = span.with_parent(parent);
            }
            run.tools.insert(tool_key(call), span)
        });
    }

    fn close_tool(&self, run_id: &str, call: &ToolCall, error: Option<&str>) {
        self.with_run(run_id, |run| {
            let mut span = run.tools.remove(&tool_key(call))?;
            match error {
                Some(e) => span.fail(e),
                None => span.end(true),
            }
            Some(span)
        });
    }
}

impl Feature for TracingFeature {
    type Config = TracingConfig;
    const KEY: &'static str = "weft.tracing";

    fn install(config: TracingConfig, pipeline: &mut Pipeline) -> Result<Arc<Self>, AgentError> {
        let feature = Arc::new(Self {
            engine: config.engine.unwrap_or_default(),
            runs: Mutex::new(HashMap::new()),
        });

        let f = Arc::clone(&feature);
        pipeline.intercept::<AgentStarting, _>(move |_ctx, e| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                f.start_run(&e.agent_id, &e.run_id);
                Ok(())
            })
        });
        let f = Arc::clone(&feature);
        pipeline.intercept::<AgentFinished, _>(move |_ctx, e| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                f.finish_run(&e.run_id, None);
                Ok(())
            })
        });
        let f = Arc::clone(&feature);
        pipeline.intercept::<AgentRunError, _>(move |_ctx, e| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                f.finish_run(&e.run_id, Some(&e.error));
                Ok(())
            })
        });

        let f = Arc::clone(&feature);
        pipeline.intercept::<BeforeNode, _>(move |ctx, e| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                f.open_node(ctx.run_id(), &e.node);
                Ok(())
            })
        });
        let f = Arc::clone(&feature);
        pipeline.intercept::<AfterNode, _>(move |ctx, e| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                f.close_node(ctx.run_id(), Some(&e.next.node_id), None);
                Ok(())
            })
        });
        let f = Arc::clone(&feature);
        pipeline.intercept::<NodeExecutionError, _>(move |ctx, e| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                f.close_node(ctx.run_id(), None, Some(&e.error));
                Ok(())
            })
        });

        let f = Arc::clone(&feature);
        pipeline.intercept::<BeforeLlmCall, _>(move |ctx, e| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                f.open_llm(ctx.run_id(), &e.model.id, e.prompt.messages.len());
                Ok(())
            })
        });
        let f = Arc::clone(&feature);
        pipeline.intercept::<AfterLlmCall, _>(move |ctx, e| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                f.close_llm(ctx.run_id(), e.responses.len());
                Ok(())
            })
        });

        let f = Arc::clone(&feature);
        pipeline.observe::<ToolCallStarted, _>(move |e| f.open_tool(&e.run_id, &e.call));
        let f = Arc::clone(&feature);
        pipeline.observe::<ToolCallCompleted, _>(move |e| f.close_tool(&e.run_id, &e.call, None));
        let f = Arc::clone(&feature);
        pipeline.observe::<ToolCallFailed, _>(move |e| f.close_tool(&e.run_id, &e.call, Some(&e.error)));
        let f = Arc::clone(&feature);
        pipeline.observe::<ToolValidationFailed, _>(move |e| f.close_tool(&e.run_id, &e.call, Some(&e.error)));

        Ok(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_agent::Agent;
    use weft_agent::patterns::test_helpers::{EchoTool, ScriptedExecutor, test_model};
    use weft_core::error::LlmError;
    use weft_core::message::Message;

    fn traced_agent(executor: ScriptedExecutor) -> (Agent, Arc<TelemetryEngine>) {
        let engine = Arc::new(TelemetryEngine::new());
        let e = engine.clone();
        let agent = Agent::builder(Arc::new(executor), test_model())
            .id("traced")
            .tool(EchoTool)
            .unwrap()
            .install::<TracingFeature>(|c| c.engine = Some(e))
            .unwrap()
            .build()
            .unwrap();
        (agent, engine)
    }

    #[tokio::test]
    async fn records_nodes_llm_and_tool_spans() {
        let (agent, engine) = traced_agent(ScriptedExecutor::new(vec![
            vec![
                Message::tool_call(Some("ok".into()), "echo", &serde_json::json!({"text": "hi"})),
                Message::tool_call(Some("bad".into()), "echo", &serde_json::json!({"text": "fail"})),
            ],
            vec![Message::assistant("done")],
        ]));

        agent.run("go").await.unwrap();

        let trace = engine.recent_traces(1).remove(0);
        assert_eq!(trace.agent_id, "traced");
        assert_eq!(trace.success, Some(true));
        assert_eq!(
            trace.node_path(),
            vec!["__start__", "call_llm", "execute_tools", "send_tool_results"]
        );
        assert_eq!(trace.count(SpanKind::LlmCall), 2);
        assert_eq!(trace.count(SpanKind::ToolCall), 2);
        assert_eq!(trace.failed_spans().count(), 1);

        let root = trace.root().unwrap();
        assert_eq!(root.success, Some(true));
        let tool_parent = trace
            .spans
            .iter()
            .find(|s| s.kind == SpanKind::ToolCall)
            .and_then(|s| s.parent_id.clone())
            .unwrap();
        let execute_node = trace.spans.iter().find(|s| s.label == "execute_tools").unwrap();
        assert_eq!(tool_parent, execute_node.id);
        assert_eq!(agent.feature::<TracingFeature>().unwrap().open_runs(), 0);
    }

    #[tokio::test]
    async fn failed_run_closes_everything() {
        let (agent, engine) = traced_agent(ScriptedExecutor::failing(LlmError::Timeout("30s".into())));

        agent.run("go").await.unwrap_err();

        let trace = engine.recent_traces(1).remove(0);
        assert_eq!(trace.success, Some(false));
        assert!(trace.spans.iter().all(|s| !s.is_open()));
        let node = trace.spans.iter().find(|s| s.label == "call_llm").unwrap();
        assert_eq!(node.success, Some(false));
        assert!(node.error.as_deref().unwrap().contains("timed out"));
        assert!(trace.root().unwrap().error.is_some());
    }
}
