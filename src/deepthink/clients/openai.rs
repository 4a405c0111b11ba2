//! The `OpenAIGateway` struct implements `ModelGateway` on top of OpenAI's Responses API
//! with strict JSON-schema structured outputs.
//!
//! # Key Features
//!
//! - **Both calling conventions**: a [`GatewayRequest::History`] is sent as the `input`
//!   array; a [`GatewayRequest::Continuation`] is sent as `previous_response_id` plus one
//!   input message.
//! - **Structured outputs**: the selected [`ResponseSchema`] is attached as
//!   `text.format` and the returned text is parsed with [`schema::parse_turn`].
//! - **Automatic Usage Capture**: the latest `TokenUsage` is stored internally; read it
//!   with `last_usage()`.
//!
//! # Example
//!
//! ```rust,no_run
//! use deepthink::clients::openai::{Model, OpenAIGateway};
//! use deepthink::gateway::{GatewayRequest, Message, ModelGateway};
//! use deepthink::schema::ResponseSchema;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let key = std::env::var("OPENAI_API_KEY")?;
//!     let gateway = OpenAIGateway::new_with_model_enum(&key, Model::GPT4oMini);
//!
//!     let request = GatewayRequest::History(vec![
//!         Message::developer("You are one of the agents carrying out a task."),
//!         Message::user("Plan a weekend in Kyoto."),
//!     ]);
//!     let response = gateway.respond(&request, ResponseSchema::AssistantResponse).await?;
//!     println!("{:?}", response.output_parsed);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

use crate::deepthink::gateway::{
    GatewayRequest, GatewayResponse, Message, ModelGateway, TokenUsage,
};
use crate::deepthink::http_client_pool::get_or_create_client;
use crate::deepthink::schema::{self, ResponseSchema};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model identifiers known to support strict structured outputs.
pub enum Model {
    /// `gpt-4o` – Omni model with text + image inputs.
    GPT4o,
    /// `gpt-4o-mini` – cost effective GPT-4o derivative.
    GPT4oMini,
    /// `gpt-4.1` – general availability GPT-4.1.
    GPT41,
    /// `gpt-4.1-mini` – reduced cost GPT-4.1 tier.
    GPT41Mini,
    /// `gpt-4.1-nano` – ultra low cost GPT-4.1 derivative.
    GPT41Nano,
    /// `gpt-5-mini` – fast variant of GPT-5.
    GPT5Mini,
    /// `o4-mini` – O-series low-latency reasoning tier.
    O4Mini,
}

/// Convert a [`Model`] variant into the string identifier expected by the REST API.
pub fn model_to_string(model: Model) -> String {
    match model {
        Model::GPT4o => "gpt-4o".to_string(),
        Model::GPT4oMini => "gpt-4o-mini".to_string(),
        Model::GPT41 => "gpt-4.1".to_string(),
        Model::GPT41Mini => "gpt-4.1-mini".to_string(),
        Model::GPT41Nano => "gpt-4.1-nano".to_string(),
        Model::GPT5Mini => "gpt-5-mini".to_string(),
        Model::O4Mini => "o4-mini".to_string(),
    }
}

/// Non-success HTTP status returned by the API.
#[derive(Debug)]
pub struct ApiError {
    pub status: u16,
    pub body: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpenAI API returned {}: {}", self.status, self.body)
    }
}

impl Error for ApiError {}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<&'a str>,
    text: Value,
}

#[derive(Deserialize)]
struct ResponsesReply {
    id: String,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
    total_tokens: usize,
}

fn input_message(message: &Message) -> InputMessage<'_> {
    InputMessage {
        role: message.role.as_str(),
        content: &message.content,
    }
}

/// Serialize `request` into a Responses API payload for `model`.
fn build_body(
    model: &str,
    request: &GatewayRequest,
    schema: ResponseSchema,
) -> Result<Value, serde_json::Error> {
    let (input, previous_response_id): (Vec<InputMessage<'_>>, Option<&str>) = match request {
        GatewayRequest::History(messages) => (messages.iter().map(input_message).collect(), None),
        GatewayRequest::Continuation {
            continuation_id,
            message,
        } => (vec![input_message(message)], Some(continuation_id.as_str())),
    };
    let body = ResponsesRequest {
        model,
        input,
        previous_response_id,
        text: serde_json::json!({
            "format": {
                "type": "json_schema",
                "name": schema.name(),
                "schema": schema::json_schema(schema),
                "strict": true,
            }
        }),
    };
    serde_json::to_value(&body)
}

/// Concatenate every `output_text` fragment of every message item.
fn collect_output_text(reply: &ResponsesReply) -> String {
    reply
        .output
        .iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content.iter())
        .filter(|content| content.kind == "output_text")
        .map(|content| content.text.as_str())
        .collect()
}

/// Gateway for OpenAI's Responses API.
///
/// Holds the selected model, the base URL, and a [`TokenUsage`] slot for the most recent
/// request. HTTP connections come from the shared pool in
/// [`http_client_pool`](crate::deepthink::http_client_pool).
pub struct OpenAIGateway {
    api_key: String,
    model: String,
    base_url: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIGateway {
    /// Construct a new gateway using the provided API key and [`Model`] variant.
    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_string(secret_key, &model_to_string(model))
    }

    /// Construct a new gateway using the provided API key and explicit model name.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, DEFAULT_BASE_URL)
    }

    /// Construct a gateway targeting a custom OpenAI compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIGateway {
            api_key: secret_key.to_string(),
            model: model_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_usage: Mutex::new(None),
        }
    }

    /// Build a gateway from `OPENAI_API_KEY`, plus the optional `OPENAI_BASE_URL` and
    /// `DEEPTHINK_MODEL` (default `gpt-4o-mini`).
    pub fn from_env() -> Result<Self, Box<dyn Error + Send + Sync>> {
        let key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| "OPENAI_API_KEY is not set".to_string())?;
        let model =
            std::env::var("DEEPTHINK_MODEL").unwrap_or_else(|_| model_to_string(Model::GPT4oMini));
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new_with_base_url(&key, &model, &base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ModelGateway for OpenAIGateway {
    async fn respond(
        &self,
        request: &GatewayRequest,
        schema: ResponseSchema,
    ) -> Result<GatewayResponse, Box<dyn Error + Send + Sync>> {
        let client = get_or_create_client(&self.base_url)?;
        let body = build_body(&self.model, request, schema)?;

        let response = client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!(
                "OpenAIGateway::respond(...): OpenAI API Error: {} {}",
                status,
                body
            );
            return Err(Box::new(ApiError {
                status: status.as_u16(),
                body,
            }));
        }

        let reply: ResponsesReply = response.json().await?;
        if let Some(usage) = &reply.usage {
            if let Ok(mut slot) = self.token_usage.lock() {
                *slot = Some(TokenUsage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    total_tokens: usage.total_tokens,
                });
            }
        }

        let output_text = collect_output_text(&reply);
        let output_parsed = schema::parse_turn(schema, &output_text);
        if output_parsed.is_none() {
            log::warn!(
                "OpenAIGateway::respond(...): response {} does not match {}",
                reply.id,
                schema
            );
        }
        Ok(GatewayResponse {
            id: reply.id,
            output_text,
            output_parsed,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_body() {
        let request = GatewayRequest::History(vec![
            Message::developer("rules"),
            Message::user("task"),
            Message::assistant("{}", "resp_1"),
        ]);
        let body = build_body("gpt-4o-mini", &request, ResponseSchema::AssistantResponse).unwrap();

        assert_eq!(body["model"], json!("gpt-4o-mini"));
        assert_eq!(body["input"].as_array().unwrap().len(), 3);
        assert_eq!(body["input"][0], json!({"role": "developer", "content": "rules"}));
        assert_eq!(body["input"][2]["role"], json!("assistant"));
        assert!(body.get("previous_response_id").is_none());
        assert_eq!(body["text"]["format"]["name"], json!("Response"));
        assert_eq!(body["text"]["format"]["strict"], json!(true));
    }

    #[test]
    fn test_continuation_body() {
        let request = GatewayRequest::Continuation {
            continuation_id: "resp_9".into(),
            message: Message::user("Subtask completed: done"),
        };
        let body = build_body("gpt-4o-mini", &request, ResponseSchema::InquiryResponse).unwrap();

        assert_eq!(body["previous_response_id"], json!("resp_9"));
        assert_eq!(
            body["input"],
            json!([{"role": "user", "content": "Subtask completed: done"}])
        );
        assert_eq!(body["text"]["format"]["name"], json!("Response2"));
    }

    #[test]
    fn test_collect_output_text_skips_non_message_items() {
        let reply: ResponsesReply = serde_json::from_value(json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"thought\":\"a\","},
                    {"type": "output_text", "text": "\"action\":{}}"}
                ]}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();

        assert_eq!(
            collect_output_text(&reply),
            "{\"thought\":\"a\",\"action\":{}}"
        );
        assert_eq!(reply.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_base_url_is_normalised() {
        let gateway = OpenAIGateway::new_with_base_url("key", "m", "http://localhost:8080/v1/");
        assert_eq!(gateway.base_url(), "http://localhost:8080/v1");
        assert_eq!(gateway.model_name(), "m");
        assert!(gateway.last_usage().is_none());
    }
}
