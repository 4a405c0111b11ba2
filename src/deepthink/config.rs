//! Configuration for the DeepThink router.
//!
//! [`DeepThinkConfig`] is a plain struct; construct it however you like. No config-file
//! parsing dependencies are involved. Provider settings (API key, model, base URL) live on
//! the gateway, see [`OpenAIGateway`](crate::clients::openai::OpenAIGateway).
//!
//! # Example
//!
//! ```rust
//! use deepthink::{CallingConvention, DeepThinkConfig};
//!
//! let config = DeepThinkConfig::default()
//!     .with_calling_convention(CallingConvention::Continuation);
//! assert!(config.instructions.starts_with("You are one of the agents"));
//! ```

/// Developer instructions given to every agent of the tree.
pub const AGENT_INSTRUCTIONS: &str = "You are one of the agents carrying out a task.
You can repeat the following three types of actions.
# Subtask Request
Ask other agents for a subtask.
Please clarify the end condition.
# Task Detail Inquiry
Ask the task requester for details.
They may not always reply.
# Task Completion Notification
Notify the task requester that the task is completed.";

/// How the router hands a branch's context to the gateway.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallingConvention {
    /// Always send the complete message history.
    #[default]
    FullHistory,
    /// Send the continuation token of the branch's last reply plus the new message when a
    /// token is available, the full history otherwise.
    Continuation,
}

/// Router configuration.
#[derive(Clone, Debug)]
pub struct DeepThinkConfig {
    /// Developer message opening every fresh context (root task and each subtask).
    pub instructions: String,
    pub calling_convention: CallingConvention,
}

impl Default for DeepThinkConfig {
    fn default() -> Self {
        Self {
            instructions: AGENT_INSTRUCTIONS.to_string(),
            calling_convention: CallingConvention::FullHistory,
        }
    }
}

impl DeepThinkConfig {
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_calling_convention(mut self, convention: CallingConvention) -> Self {
        self.calling_convention = convention;
        self
    }
}
