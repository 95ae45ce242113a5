//! Native Ollama backend.
//!
//! Talks to Ollama's own API rather than its OpenAI shim:
//! - `POST /api/chat` with `stream: false` for one complete reply
//! - `GET /api/tags` for model listing and health probes
//!
//! Ollama tool calls carry structured arguments and usually no call ID, so
//! replies are mapped into [`MessageToolCall`]s with `id: None` unless the
//! server supplied one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use toolloop_core::error::ProviderError;
use toolloop_core::message::{Message, MessageToolCall};
use toolloop_core::provider::*;
use tracing::debug;

use crate::http::{build_client, check_status, send_error};

/// Default Ollama address when nothing is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

pub struct OllamaBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
        })
    }

    /// Backend at the default local address with a two minute timeout.
    pub fn local() -> Result<Self, ProviderError> {
        Self::new(DEFAULT_ENDPOINT, Duration::from_secs(120))
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: structured_arguments(&tc.arguments),
                        },
                    })
                    .collect(),
                tool_name: m.tool_name.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(request: &ChatRequest) -> ApiRequest {
        ApiRequest {
            model: request.model.clone(),
            messages: Self::to_api_messages(&request.messages),
            stream: false,
            tools: Self::to_api_tools(&request.tools),
            options: request.temperature.map(|temperature| ApiOptions { temperature }),
        }
    }

    fn from_api_response(response: ApiResponse) -> Result<ChatReply, ProviderError> {
        let api_message = response
            .message
            .ok_or_else(|| ProviderError::InvalidResponse("missing message".into()))?;

        let tool_calls = api_message
            .tool_calls
            .into_iter()
            .map(|tc| MessageToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let message = Message::assistant_tool_calls(api_message.content, tool_calls);

        let usage = match (response.prompt_eval_count, response.eval_count) {
            (None, None) => None,
            (prompt, completion) => {
                let prompt_tokens = prompt.unwrap_or(0);
                let completion_tokens = completion.unwrap_or(0);
                Some(Usage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                })
            }
        };

        Ok(ChatReply {
            message,
            usage,
            model: response.model,
        })
    }
}

/// Ollama only accepts argument objects. Strings that hold JSON are parsed;
/// anything unparseable is sent as an empty object.
fn structured_arguments(arguments: &serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(raw) => serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .filter(|v| v.is_object())
            .unwrap_or_else(|| serde_json::json!({})),
        serde_json::Value::Null => serde_json::json!({}),
        other => other.clone(),
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ProviderError> {
        let url = format!("{}/api/chat", self.endpoint);
        let body = Self::build_body(&request);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat request to Ollama"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let response = check_status(response, &request.model).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::from_api_response(api_response)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(send_error)?;
        let response = check_status(response, "").await?;

        let tags: ApiTags = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse model list: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ApiOptions>,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    message: Option<ApiMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiTags {
    #[serde(default)]
    models: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    name: String,
}
