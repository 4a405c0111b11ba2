//! Router event system.
//!
//! Implement [`EventHandler`] to observe a [`DeepThink`](crate::DeepThink) session: gateway
//! round-trips, appended entries, rejected operations and resets. The single method has a
//! default no-op implementation, so handlers only match the variants they care about.
//!
//! # Event Flow (during `reply_to_inquiry`)
//!
//! ```text
//! OperationStarted { operation: "reply_to_inquiry" }
//!   ├─ GatewayCallStarted  { agent_id: 0, schema: InquiryResponse }
//!   ├─ GatewayCallCompleted{ agent_id: 0 }
//!   ├─ GatewayCallStarted  { agent_id: 1, schema: AssistantResponse }
//!   └─ GatewayCallCompleted{ agent_id: 1 }
//! EntriesAppended { indices: [n, n+1] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use deepthink::event::{DeepThinkEvent, EventHandler};
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_event(&self, event: &DeepThinkEvent) {
//!         if let DeepThinkEvent::EntriesAppended { indices, .. } = event {
//!             println!("appended {:?}", indices);
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::deepthink::gateway::TokenUsage;
use crate::deepthink::schema::ResponseSchema;

/// Events emitted by the router.
#[derive(Debug, Clone)]
pub enum DeepThinkEvent {
    /// A mutating operation passed its in-flight check.
    OperationStarted {
        session_id: String,
        operation: &'static str,
    },

    /// Fired before each gateway call.
    GatewayCallStarted {
        session_id: String,
        /// Agent the produced entry will belong to.
        agent_id: u32,
        schema: ResponseSchema,
        /// Messages sent over the wire (1 in continuation mode).
        message_count: usize,
    },

    /// Fired after a gateway call returned, parsed or not.
    GatewayCallCompleted {
        session_id: String,
        agent_id: u32,
        response_id: String,
        parsed: bool,
        tokens_used: Option<TokenUsage>,
    },

    /// All entries produced by an operation were committed.
    EntriesAppended {
        session_id: String,
        operation: &'static str,
        indices: Vec<usize>,
    },

    /// An operation failed and appended nothing.
    OperationFailed {
        session_id: String,
        operation: &'static str,
        error: String,
    },

    /// The log was cleared.
    LogReset {
        session_id: String,
        discarded: usize,
    },
}

/// Receives [`DeepThinkEvent`]s.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, _event: &DeepThinkEvent) {}
}
