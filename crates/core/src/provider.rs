//! ChatBackend trait — the abstraction over LLM chat endpoints.
//!
//! A backend knows how to send a conversation (plus the tools catalog) to a
//! model and get one complete reply back, and how to probe whether the
//! service is reachable at all.
//!
//! Backends never retry. Retry policy belongs to the agent loop so that
//! health checks, backoff and tool execution stay separately testable.
//!
//! Implementations: Ollama (native API), OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// A single chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "qwen3:8b", "gpt-4o")
    pub model: String,

    /// The conversation messages, system prompt first
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Sampling temperature; backend default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) reply from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    /// The generated assistant message. May carry content, tool calls,
    /// both, or neither.
    pub message: Message,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    #[serde(default)]
    pub model: String,
}

impl ChatReply {
    /// Reply carrying only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(content),
            usage: None,
            model: String::new(),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Outcome of a health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unreachable { reason: String },
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }
}

/// The core backend trait.
///
/// The agent loop calls `health_check()` and `chat()` without knowing which
/// service sits behind them.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// The configured endpoint, shown to users when the backend is down.
    fn endpoint(&self) -> &str;

    /// Send a request and get a complete reply.
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatReply, ProviderError>;

    /// List the models the backend can serve.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError>;

    /// Health check — can we reach the backend?
    ///
    /// Default implementation treats a successful model listing as healthy.
    async fn health_check(&self) -> Health {
        match self.list_models().await {
            Ok(_) => Health::Healthy,
            Err(e) => {
                tracing::warn!(backend = %self.name(), endpoint = %self.endpoint(), error = %e, "Health check failed");
                Health::Unreachable {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ListingBackend {
        fail: bool,
    }

    #[async_trait]
    impl ChatBackend for ListingBackend {
        fn name(&self) -> &str {
            "listing"
        }

        fn endpoint(&self) -> &str {
            "http://localhost:11434"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<ChatReply, ProviderError> {
            Ok(ChatReply::text("ok"))
        }

        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            if self.fail {
                Err(ProviderError::Network("connection refused".into()))
            } else {
                Ok(vec!["qwen3:8b".into()])
            }
        }
    }

    #[tokio::test]
    async fn default_health_check_uses_model_listing() {
        assert!(ListingBackend { fail: false }.health_check().await.is_healthy());

        let health = ListingBackend { fail: true }.health_check().await;
        match health {
            Health::Unreachable { reason } => assert!(reason.contains("connection refused")),
            Health::Healthy => panic!("expected unreachable"),
        }
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "getWeather".into(),
            description: "Get the weather for a city".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string", "description": "City name" }
                },
                "required": ["city"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("getWeather"));
        assert!(json.contains("city"));
    }

    #[test]
    fn request_omits_unset_temperature() {
        let req = ChatRequest {
            model: "qwen3:8b".into(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            temperature: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("temperature"));
        assert!(!json.contains("tools"));
    }
}
