//! The default chat-with-tools strategy.
//!
//! ```text
//! __start__ ─► call_llm ──(assistant text)──────────────► __finish__
//!                 │                                          ▲
//!            (tool calls)                                    │
//!                 ▼                                          │
//!           execute_tools ─► send_tool_results ─(text)───────┘
//!                 ▲                 │
//!                 └──(tool calls)───┘
//! ```

use super::nodes::{always, execute_tools, llm_request, on_assistant_message, on_tool_calls, send_tool_results};
use super::{FINISH, START, Strategy};
use crate::error::AgentError;

pub const CALL_LLM: &str = "call_llm";
pub const EXECUTE_TOOLS: &str = "execute_tools";
pub const SEND_TOOL_RESULTS: &str = "send_tool_results";

/// Build the single-run strategy. Input: the user's text; output: the
/// assistant's final text.
pub fn single_run_strategy() -> Result<Strategy, AgentError> {
    Strategy::builder("single_run")
        .node(CALL_LLM, llm_request)
        .node(EXECUTE_TOOLS, execute_tools)
        .node(SEND_TOOL_RESULTS, send_tool_results)
        .edge(START, CALL_LLM, always)
        .edge(CALL_LLM, EXECUTE_TOOLS, on_tool_calls)
        .edge(CALL_LLM, FINISH, on_assistant_message)
        .edge(EXECUTE_TOOLS, SEND_TOOL_RESULTS, always)
        .edge(SEND_TOOL_RESULTS, EXECUTE_TOOLS, on_tool_calls)
        .edge(SEND_TOOL_RESULTS, FINISH, on_assistant_message)
        .build()
}
