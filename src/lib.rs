//! # DeepThink
//!
//! DeepThink drives a tree of cooperating language-model agents that share one append-only
//! conversation log. Agents delegate subtasks to children, children ask their requester for
//! details, and finished children report back, while every branch keeps its own isolated
//! message context.
//!
//! The crate is layered as:
//!
//! * **[`ConversationLog`]**: immutable entries in insertion order, each storing the message
//!   history of its branch by value.
//! * **[`identity`]**: depth ids for agents (root = 0, child = parent + 1) and ancestor
//!   resolution.
//! * **[`DeepThink`]**: the router, the only mutator of the log. It exposes `send`,
//!   `invoke_subtask`, `reply_to_inquiry`, `notify_task_completion`, `advance` and `reset`.
//! * **[`ModelGateway`]**: the stateless boundary to a language model with structured
//!   outputs, implemented for OpenAI by [`clients::openai::OpenAIGateway`].
//!
//! ## Delegation at a glance
//!
//! ```text
//! send("Book a flight")          user, agent0: Subtask Request
//! advance()  (invoke subtask)    user, agent1: Task Detail Inquiry
//! advance()  (reply to inquiry)  agent0: Respond to Inquiry, agent1: Task Completion Notification
//! advance()  (notify completion) agent1: ...next action of the agent0 branch
//! ```
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use deepthink::clients::openai::{Model, OpenAIGateway};
//! use deepthink::DeepThink;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     deepthink::init_logger();
//!
//!     let api_key = std::env::var("OPENAI_API_KEY")?;
//!     let gateway = Arc::new(OpenAIGateway::new_with_model_enum(&api_key, Model::GPT4oMini));
//!     let session = DeepThink::new(gateway);
//!
//!     session.send("Plan a three day trip to Kyoto").await?;
//!     if let Some(transition) = session.available_transition().await {
//!         println!("next: {}", transition.name());
//!         session.advance().await?;
//!     }
//!
//!     for entry in session.entries().await {
//!         println!("{}\n", entry);
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding DeepThink can opt in to `RUST_LOG` driven diagnostics without
/// choosing a logging backend upfront.
///
/// ```rust
/// deepthink::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `deepthink` module.
pub mod deepthink;

// Re-exporting key items for easier external access.
pub use deepthink::clients;
pub use deepthink::config::{CallingConvention, DeepThinkConfig, AGENT_INSTRUCTIONS};
pub use deepthink::conversation_log;
pub use deepthink::conversation_log::{AgentEntry, ConversationLog, Entry, Transition, UserEntry};
pub use deepthink::error::DeepThinkError;
pub use deepthink::event;
pub use deepthink::event::{DeepThinkEvent, EventHandler};
pub use deepthink::gateway;
pub use deepthink::gateway::{
    GatewayRequest, GatewayResponse, Message, ModelGateway, Role, TokenUsage,
};
pub use deepthink::identity;
pub use deepthink::router::DeepThink;
pub use deepthink::schema;
pub use deepthink::schema::{Action, AgentTurn, ResponseSchema, Subtask};
