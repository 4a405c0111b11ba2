//! The model gateway is the stateless boundary between the router and a language model.
//!
//! A [`ModelGateway`] does not keep track of the delegation tree; the
//! [`ConversationLog`](crate::ConversationLog) does that. Each call receives the full
//! context (or a continuation token plus one new message), a [`ResponseSchema`] selector,
//! and returns the raw output together with the structurally parsed [`AgentTurn`].
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use deepthink::gateway::{GatewayRequest, GatewayResponse, ModelGateway};
//! use deepthink::schema::{self, ResponseSchema};
//! use std::error::Error;
//!
//! struct Canned;
//!
//! #[async_trait]
//! impl ModelGateway for Canned {
//!     async fn respond(
//!         &self,
//!         _request: &GatewayRequest,
//!         schema: ResponseSchema,
//!     ) -> Result<GatewayResponse, Box<dyn Error + Send + Sync>> {
//!         let text = r#"{"thought":"done","action":{"type":"task_completion_notification","result":"ok"}}"#;
//!         Ok(GatewayResponse {
//!             id: "resp_1".into(),
//!             output_parsed: schema::parse_turn(schema, text),
//!             output_text: text.into(),
//!         })
//!     }
//!
//!     fn model_name(&self) -> &str {
//!         "canned"
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

use crate::deepthink::schema::{AgentTurn, ResponseSchema};

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    // fixed instructions steering every agent
    Developer,
    // task text, subtask detail, or a relayed message from another agent
    User,
    // generated by the model
    Assistant,
}

impl Role {
    /// Wire name used by chat-style APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in a context sent to or received from the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
    /// Continuation token of the response that produced this message. Only assistant
    /// messages recorded after a gateway call carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_id: Option<String>,
}

impl Message {
    pub fn developer(content: impl Into<String>) -> Self {
        Self {
            role: Role::Developer,
            content: content.into(),
            continuation_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            continuation_id: None,
        }
    }

    /// Assistant reply tagged with the continuation token the gateway returned for it.
    pub fn assistant(content: impl Into<String>, continuation_id: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            continuation_id: Some(continuation_id.into()),
        }
    }
}

/// What the gateway is asked to continue from: the whole context, or a continuation
/// token and the single message that follows it. Never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayRequest {
    History(Vec<Message>),
    Continuation {
        continuation_id: String,
        message: Message,
    },
}

impl GatewayRequest {
    /// Number of messages that travel over the wire for this request.
    pub fn message_count(&self) -> usize {
        match self {
            GatewayRequest::History(messages) => messages.len(),
            GatewayRequest::Continuation { .. } => 1,
        }
    }
}

/// Result of one gateway round-trip.
#[derive(Clone, Debug)]
pub struct GatewayResponse {
    /// Continuation token for the produced response.
    pub id: String,
    /// Raw text emitted by the model.
    pub output_text: String,
    /// `None` when the output did not match the requested schema.
    pub output_parsed: Option<AgentTurn>,
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Trait defining the request/response boundary to a language model.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Run one structured-output call against the model.
    /// - `request`: full context or continuation token plus one message.
    /// - `schema`: which structured response the model must produce.
    async fn respond(
        &self,
        request: &GatewayRequest,
        schema: ResponseSchema,
    ) -> Result<GatewayResponse, Box<dyn Error + Send + Sync>>;

    /// Model identifier used for logging.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* `respond()` call.
    fn last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|usage| usage.clone()))
    }

    /// Gateways that track token usage return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}
