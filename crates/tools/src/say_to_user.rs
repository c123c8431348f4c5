//! `say_to_user`: show a message to the user without waiting for a reply.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use weft_core::error::ToolError;
use weft_core::tool::{Tool, ToolDescriptor, ToolParameter, ToolParameterType, ToolPermit};

use crate::io::UserChannel;

pub const NAME: &str = "say_to_user";

#[derive(Debug, Deserialize)]
pub struct SayArgs {
    pub message: String,
}

pub struct SayToUserTool {
    channel: Arc<dyn UserChannel>,
}

impl SayToUserTool {
    pub fn new(channel: Arc<dyn UserChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Tool for SayToUserTool {
    type Args = SayArgs;
    type Output = String;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(NAME, "Service tool, used by the agent to talk to the user.").required(
            ToolParameter::new("message", "Message for the user", ToolParameterType::String),
        )
    }

    async fn execute(&self, args: SayArgs, _permit: &ToolPermit) -> Result<String, ToolError> {
        self.channel
            .say(&args.message)
            .await
            .map_err(|reason| ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason,
            })?;
        Ok("DONE".into())
    }
}
