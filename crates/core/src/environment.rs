//! Tool environment: The only path by which tool bodies run.
//!
//! A batch of calls fans out concurrently and is joined before returning.
//! Each call is isolated: a validation error, a failed body or a panic turns
//! into a textual [`ToolResult`] and never affects sibling calls. Results are
//! returned in input order, each tagged with its originating call.
//!
//! The batch runs inside the caller's future, so dropping that future (for
//! example when the run is cancelled) drops all outstanding calls with it.

use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::tool::{ToolCall, ToolPermit, ToolRegistry, ToolResult};

/// Lifecycle callbacks fired for every dispatched call.
///
/// Hooks are synchronous and run on the task executing the call.
pub trait ToolObserver: Send + Sync {
    /// Arguments decoded; the body is about to run.
    fn on_tool_call(&self, _call: &ToolCall) {}

    /// Arguments failed schema decoding or tool-declared validation.
    fn on_tool_validation_error(&self, _call: &ToolCall, _error: &str) {}

    /// The tool is unknown, or its body failed or panicked.
    fn on_tool_call_failure(&self, _call: &ToolCall, _error: &str) {}

    fn on_tool_call_result(&self, _call: &ToolCall, _result: &ToolResult) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ToolObserver for NoopObserver {}

/// Executes tool calls against a fixed registry.
#[derive(Clone)]
pub struct ToolEnvironment {
    registry: Arc<ToolRegistry>,
    observer: Arc<dyn ToolObserver>,
}

impl ToolEnvironment {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a batch of calls concurrently, returning one result per call
    /// in input order.
    pub async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        debug!(count = calls.len(), "Dispatching tool batch");
        join_all(calls.iter().map(|call| self.execute_tool(call))).await
    }

    /// Execute a single call through the full hook sequence.
    pub async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.tool) else {
            let message = ToolError::NotFound(call.tool.clone()).to_string();
            warn!(tool = %call.tool, "Tool call for unregistered tool");
            self.observer.on_tool_call_failure(call, &message);
            return ToolResult::failure(call, message);
        };

        let args = match tool.decode(&call.args) {
            Ok(args) => args,
            Err(e) => {
                let message = e.to_string();
                warn!(tool = %call.tool, error = %message, "Tool arguments rejected");
                self.observer.on_tool_validation_error(call, &message);
                return ToolResult::validation_error(call, message);
            }
        };

        self.observer.on_tool_call(call);
        debug!(tool = %call.tool, id = ?call.id, "Executing tool");

        let permit = ToolPermit::issue();
        let outcome = AssertUnwindSafe(tool.run(args, &permit)).catch_unwind().await;

        match outcome {
            Ok(Ok((value, text))) => {
                let result = ToolResult::success(call, value, text);
                self.observer.on_tool_call_result(call, &result);
                result
            }
            Ok(Err(e)) if e.is_validation() => {
                let message = e.to_string();
                warn!(tool = %call.tool, error = %message, "Tool rejected its arguments");
                self.observer.on_tool_validation_error(call, &message);
                ToolResult::validation_error(call, message)
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                warn!(tool = %call.tool, error = %message, "Tool execution failed");
                self.observer.on_tool_call_failure(call, &message);
                ToolResult::failure(call, message)
            }
            Err(panic) => {
                let message = ToolError::ExecutionFailed {
                    tool_name: call.tool.clone(),
                    reason: format!("panicked: {}", panic_message(panic.as_ref())),
                }
                .to_string();
                warn!(tool = %call.tool, error = %message, "Tool panicked");
                self.observer.on_tool_call_failure(call, &message);
                ToolResult::failure(call, message)
            }
        }
    }
}

impl std::fmt::Debug for ToolEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEnvironment")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
