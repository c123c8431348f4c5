//! Built-in tools for weft agents.
//!
//! - `say_to_user`: show the user a message
//! - `ask_user`: ask the user and wait for the answer
//! - `exit`: declare the conversation finished
//!
//! The user-facing tools talk through a [`UserChannel`]: the console by
//! default, or anything else that implements the trait.

pub mod ask_user;
pub mod exit;
pub mod io;
pub mod say_to_user;

use std::sync::Arc;
use weft_core::error::ToolError;
use weft_core::tool::ToolRegistry;

pub use ask_user::AskUserTool;
pub use exit::{ExitTool, exit_message, on_exit};
pub use io::{ConsoleChannel, ScriptedChannel, UserChannel};
pub use say_to_user::SayToUserTool;

/// A registry with every built-in tool, wired to `channel`.
pub fn builtin_registry(channel: Arc<dyn UserChannel>) -> Result<ToolRegistry, ToolError> {
    ToolRegistry::new()
        .with(SayToUserTool::new(Arc::clone(&channel)))?
        .with(AskUserTool::new(channel))?
        .with(ExitTool)
}

/// Built-in tools on the console.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    builtin_registry(Arc::new(ConsoleChannel))
}
