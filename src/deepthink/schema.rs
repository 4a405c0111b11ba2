//! Structured-output schemas and the structural parser for agent turns.
//!
//! Every gateway call asks the model for a JSON object `{thought, action}`. Two shapes are
//! used:
//!
//! * [`ResponseSchema::AssistantResponse`] — `action` is one of the three delegation
//!   actions (`subtask_request`, `task_detail_inquiry`, `task_completion_notification`).
//! * [`ResponseSchema::InquiryResponse`] — `action` must be `respond_to_inquiry`. Used when
//!   an ancestor answers a child's question.
//!
//! Parsing is purely structural: the output either deserializes into an [`AgentTurn`] whose
//! action is allowed by the requested schema, or it is rejected.
//!
//! ```rust
//! use deepthink::schema::{parse_turn, Action, ResponseSchema};
//!
//! let raw = r#"{"thought":"Ask","action":{"type":"task_detail_inquiry","inquiry":"Which city?"}}"#;
//! let turn = parse_turn(ResponseSchema::AssistantResponse, raw).unwrap();
//! assert_eq!(turn.action, Action::TaskDetailInquiry { inquiry: "Which city?".into() });
//!
//! // The same output is not a valid answer to an inquiry.
//! assert!(parse_turn(ResponseSchema::InquiryResponse, raw).is_none());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// A unit of work handed from an agent to a freshly created child agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub title: String,
    pub detail: String,
}

/// What an agent decided to do next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Delegate a narrower task to a child agent.
    SubtaskRequest { subtask: Subtask },
    /// Ask the task requester (the ancestor) for details.
    TaskDetailInquiry { inquiry: String },
    /// Report the task as done to the requester.
    TaskCompletionNotification { result: String },
    /// An ancestor's answer to a child's inquiry.
    RespondToInquiry { message: String },
}

impl Action {
    /// Label shown by hosts when rendering the log.
    pub fn label(&self) -> &'static str {
        match self {
            Action::SubtaskRequest { .. } => "Subtask Request",
            Action::TaskDetailInquiry { .. } => "Task Detail Inquiry",
            Action::TaskCompletionNotification { .. } => "Task Completion Notification",
            Action::RespondToInquiry { .. } => "Respond to Inquiry",
        }
    }

    /// The wire tag (`"type"` field) of the action.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SubtaskRequest { .. } => "subtask_request",
            Action::TaskDetailInquiry { .. } => "task_detail_inquiry",
            Action::TaskCompletionNotification { .. } => "task_completion_notification",
            Action::RespondToInquiry { .. } => "respond_to_inquiry",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.label())?;
        match self {
            Action::SubtaskRequest { subtask } => {
                writeln!(f, "{}", subtask.title)?;
                write!(f, "{}", subtask.detail)
            }
            Action::TaskDetailInquiry { inquiry } => write!(f, "{}", inquiry),
            Action::TaskCompletionNotification { result } => write!(f, "{}", result),
            Action::RespondToInquiry { message } => write!(f, "{}", message),
        }
    }
}

/// The parsed structured output of one gateway call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTurn {
    pub thought: String,
    pub action: Action,
}

/// Selects the structured response the model must produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseSchema {
    AssistantResponse,
    InquiryResponse,
}

impl ResponseSchema {
    /// Name under which the schema is registered with the provider.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseSchema::AssistantResponse => "Response",
            ResponseSchema::InquiryResponse => "Response2",
        }
    }

    /// Whether `action` is a member of this schema's action union.
    pub fn accepts(&self, action: &Action) -> bool {
        match (self, action) {
            (ResponseSchema::InquiryResponse, Action::RespondToInquiry { .. }) => true,
            (ResponseSchema::InquiryResponse, _) => false,
            (ResponseSchema::AssistantResponse, Action::RespondToInquiry { .. }) => false,
            (ResponseSchema::AssistantResponse, _) => true,
        }
    }
}

impl fmt::Display for ResponseSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSchema::AssistantResponse => f.write_str("AssistantResponse"),
            ResponseSchema::InquiryResponse => f.write_str("InquiryResponse"),
        }
    }
}

/// Parse raw model output against `schema`. Returns `None` on any structural mismatch.
pub fn parse_turn(schema: ResponseSchema, raw: &str) -> Option<AgentTurn> {
    let turn: AgentTurn = match serde_json::from_str(raw.trim()) {
        Ok(turn) => turn,
        Err(err) => {
            log::debug!("schema::parse_turn(...): {} output rejected: {}", schema, err);
            return None;
        }
    };
    if schema.accepts(&turn.action) {
        Some(turn)
    } else {
        log::debug!(
            "schema::parse_turn(...): action '{}' is not allowed by {}",
            turn.action.kind(),
            schema
        );
        None
    }
}

fn variant(kind: &str, properties: Value, required: &[&str]) -> Value {
    let mut props = json!({ "type": { "type": "string", "enum": [kind] } });
    if let (Some(target), Some(extra)) = (props.as_object_mut(), properties.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    let mut req = vec!["type"];
    req.extend_from_slice(required);
    json!({
        "type": "object",
        "properties": props,
        "required": req,
        "additionalProperties": false,
    })
}

/// Strict JSON schema document describing `{thought, action}` for `schema`.
pub fn json_schema(schema: ResponseSchema) -> Value {
    let string = json!({ "type": "string" });
    let action = match schema {
        ResponseSchema::AssistantResponse => json!({
            "anyOf": [
                variant(
                    "subtask_request",
                    json!({
                        "subtask": {
                            "type": "object",
                            "properties": { "detail": string, "title": string },
                            "required": ["detail", "title"],
                            "additionalProperties": false,
                        }
                    }),
                    &["subtask"],
                ),
                variant("task_detail_inquiry", json!({ "inquiry": string }), &["inquiry"]),
                variant(
                    "task_completion_notification",
                    json!({ "result": string }),
                    &["result"],
                ),
            ]
        }),
        ResponseSchema::InquiryResponse => {
            variant("respond_to_inquiry", json!({ "message": string }), &["message"])
        }
    };
    let thought = match schema {
        ResponseSchema::AssistantResponse => json!({
            "type": "string",
            "description": "Let's think step by step to figure out your next action.",
        }),
        ResponseSchema::InquiryResponse => string.clone(),
    };
    json!({
        "type": "object",
        "properties": { "thought": thought, "action": action },
        "required": ["thought", "action"],
        "additionalProperties": false,
    })
}
