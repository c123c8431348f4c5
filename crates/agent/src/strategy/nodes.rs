//! Built-in node bodies and edge conditions.
//!
//! Nodes are plain functions so they can be passed straight to
//! [`StrategyBuilder::node`](super::StrategyBuilder::node).

use futures::future::BoxFuture;

use crate::context::AgentContext;
use crate::error::AgentError;
use crate::value::NodeValue;

fn unexpected(node: &str, expected: &'static str, found: &NodeValue) -> AgentError {
    AgentError::UnexpectedInput {
        node: node.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Append the input (if text) as a user message, then ask the LLM.
///
/// Output: the LLM's response messages.
pub fn llm_request(ctx: &mut AgentContext, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, AgentError>> {
    Box::pin(async move {
        match input {
            NodeValue::Text(text) => {
                if !text.is_empty() {
                    ctx.append(weft_core::Message::user(text));
                }
            }
            NodeValue::Unit => {}
            other => return Err(unexpected("llm_request", "text", &other)),
        }
        let responses = ctx.request_llm().await?;
        Ok(NodeValue::Messages(responses))
    })
}

/// Append the input text as a user message and pass it on unchanged.
pub fn append_user(ctx: &mut AgentContext, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, AgentError>> {
    Box::pin(async move {
        let Some(text) = input.as_text() else {
            return Err(unexpected("append_user", "text", &input));
        };
        ctx.append(weft_core::Message::user(text));
        Ok(input)
    })
}

/// Dispatch the incoming tool calls concurrently.
///
/// Output: one result per call, in call order.
pub fn execute_tools(ctx: &mut AgentContext, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, AgentError>> {
    Box::pin(async move {
        if !matches!(
            input,
            NodeValue::ToolCalls(_) | NodeValue::Message(_) | NodeValue::Messages(_)
        ) {
            return Err(unexpected("execute_tools", "tool calls", &input));
        }
        let calls = input.tool_calls();
        let results = ctx.execute_tools(&calls).await;
        Ok(NodeValue::ToolResults(results))
    })
}

/// Append tool results to the history, then ask the LLM again.
pub fn send_tool_results(ctx: &mut AgentContext, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, AgentError>> {
    Box::pin(async move {
        let NodeValue::ToolResults(results) = input else {
            return Err(unexpected("send_tool_results", "tool results", &input));
        };
        for result in &results {
            ctx.append(result.to_message());
        }
        let responses = ctx.request_llm().await?;
        Ok(NodeValue::Messages(responses))
    })
}

// ── Conditions ──

/// Unconditional edge; passes the value through.
pub fn always(value: &NodeValue) -> Option<NodeValue> {
    Some(value.clone())
}

/// Taken when the value carries tool calls; passes the calls on.
pub fn on_tool_calls(value: &NodeValue) -> Option<NodeValue> {
    let calls = value.tool_calls();
    (!calls.is_empty()).then_some(NodeValue::ToolCalls(calls))
}

/// Taken when LLM responses contain no tool calls; passes the assistant text on.
pub fn on_assistant_message(value: &NodeValue) -> Option<NodeValue> {
    match value {
        NodeValue::Message(_) | NodeValue::Messages(_) if value.tool_calls().is_empty() => {
            Some(NodeValue::text(value.assistant_text().unwrap_or_default()))
        }
        _ => None,
    }
}

/// Taken when the value is exactly the given text.
pub fn when_text(expected: &'static str) -> impl Fn(&NodeValue) -> Option<NodeValue> + Send + Sync + 'static {
    move |value: &NodeValue| (value.as_text() == Some(expected)).then(|| value.clone())
}
