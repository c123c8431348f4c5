//! `exit`: the agent declares it is done.
//!
//! The tool itself only acknowledges. Strategies route to their finish node
//! with the [`on_exit`] edge condition, placed after `execute_tools` and
//! ahead of the edge that sends results back to the LLM.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use weft_agent::value::NodeValue;
use weft_core::error::ToolError;
use weft_core::tool::{Tool, ToolDescriptor, ToolOutcome, ToolParameter, ToolParameterType, ToolPermit, ToolResult};

pub const NAME: &str = "exit";

#[derive(Debug, Deserialize)]
pub struct ExitArgs {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExitAck {
    pub message: String,
}

pub struct ExitTool;

#[async_trait]
impl Tool for ExitTool {
    type Args = ExitArgs;
    type Output = ExitAck;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(NAME, "Service tool, used by the agent to end the conversation on user request or agent decision.")
            .required(ToolParameter::new("message", "Final message of the agent", ToolParameterType::String))
    }

    async fn execute(&self, args: ExitArgs, _permit: &ToolPermit) -> Result<ExitAck, ToolError> {
        tracing::debug!(message = %args.message, "Agent requested exit");
        Ok(ExitAck { message: args.message })
    }

    fn encode_result(&self, _output: &ExitAck) -> Result<String, serde_json::Error> {
        Ok("DONE".into())
    }
}

/// The final message of the first successful `exit` call among `results`.
pub fn exit_message(results: &[ToolResult]) -> Option<String> {
    results.iter().find_map(|r| match &r.outcome {
        ToolOutcome::Success { value, .. } if r.tool == NAME => {
            serde_json::from_value::<ExitAck>(value.clone()).ok().map(|ack| ack.message)
        }
        _ => None,
    })
}

/// Edge condition: taken when a batch of tool results holds a successful
/// `exit`; passes the final message on as text.
pub fn on_exit(value: &NodeValue) -> Option<NodeValue> {
    match value {
        NodeValue::ToolResults(results) => exit_message(results).map(NodeValue::Text),
        _ => None,
    }
}
