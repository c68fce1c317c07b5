//! `OpenAI`-compatible chat provider

use super::{ChatRole, ChatTurn, FunctionSpec, LlmError, LlmGateway, LlmReply};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OpenAiChat {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiChat {
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a FunctionSpec,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireFunctionCall,
}

#[derive(Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

fn classify_status(status: u16, body: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::auth(format!("authentication failed ({status}): {body}")),
        429 => LlmError::rate_limit(format!("rate limited: {body}")),
        400 => LlmError::invalid_request(format!("bad request: {body}")),
        s if s >= 500 => LlmError::server_error(format!("server error ({s}): {body}")),
        s => LlmError::unknown(format!("unexpected status {s}: {body}")),
    }
}

#[async_trait]
impl LlmGateway for OpenAiChat {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        tools: &[FunctionSpec],
    ) -> Result<LlmReply, LlmError> {
        let request = WireRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|t| WireMessage {
                    role: role_str(t.role),
                    content: &t.content,
                })
                .collect(),
            tools: tools
                .iter()
                .map(|f| WireTool {
                    kind: "function",
                    function: f,
                })
                .collect(),
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("request timed out: {e}"))
                } else {
                    LlmError::network(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::unknown(format!("malformed completion payload: {e}")))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::unknown("completion contained no choices"))?;

        if let Some(call) = message.tool_calls.into_iter().next() {
            let arguments: Value = if call.function.arguments.trim().is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::Object(serde_json::Map::new()))
            };
            return Ok(LlmReply::FunctionCall {
                name: call.function.name,
                arguments,
            });
        }

        match message.content {
            Some(text) if !text.trim().is_empty() => Ok(LlmReply::Text(text)),
            _ => Err(LlmError::unknown("completion had neither text nor tool call")),
        }
    }
}
