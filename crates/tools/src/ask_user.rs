//! `ask_user`: ask the user a question and return the answer.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use weft_core::error::ToolError;
use weft_core::tool::{Tool, ToolDescriptor, ToolParameter, ToolParameterType, ToolPermit};

use crate::io::UserChannel;

pub const NAME: &str = "ask_user";

#[derive(Debug, Deserialize)]
pub struct AskArgs {
    pub message: String,
}

pub struct AskUserTool {
    channel: Arc<dyn UserChannel>,
}

impl AskUserTool {
    pub fn new(channel: Arc<dyn UserChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Tool for AskUserTool {
    type Args = AskArgs;
    type Output = String;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(NAME, "Service tool, used by the agent to ask the user a question and wait for the answer.")
            .required(ToolParameter::new("message", "Question for the user", ToolParameterType::String))
    }

    fn validate(&self, args: &AskArgs) -> Result<(), String> {
        if args.message.trim().is_empty() {
            return Err("message must not be empty".into());
        }
        Ok(())
    }

    async fn execute(&self, args: AskArgs, _permit: &ToolPermit) -> Result<String, ToolError> {
        self.channel
            .ask(&args.message)
            .await
            .map_err(|reason| ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason,
            })
    }
}
