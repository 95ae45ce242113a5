//! The agent loop implementation.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolloop_core::error::{Error, ProviderError};
use toolloop_core::message::{Message, Transcript};
use toolloop_core::provider::{ChatBackend, ChatRequest, Health};
use toolloop_core::tool::ToolRegistry;
use tracing::{debug, error, info, warn};

use crate::dispatcher::ToolDispatcher;
use crate::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::retry::{RetryError, RetryPolicy, with_retry};

/// Highest round index allowed before the loop gives up.
pub const DEFAULT_RECURSION_LIMIT: u32 = 10;

/// Terminal message when the model keeps asking for tools.
pub const RECURSION_LIMIT_MESSAGE: &str =
    "I'm having trouble processing your request. The tool calls are taking too long.";

/// Terminal message when the model answers with neither text nor tool calls.
pub const DEFAULT_EMPTY_REPLY_FALLBACK: &str =
    "I'm having trouble processing your request. Please try again.";

/// The core agent loop that orchestrates backend calls and tool execution.
pub struct AgentLoop {
    /// The chat backend to use
    backend: Arc<dyn ChatBackend>,

    /// The model to use
    model: String,

    /// Temperature setting; backend default when unset
    temperature: Option<f32>,

    /// Resolves and runs tool calls
    dispatcher: ToolDispatcher,

    system_prompt: String,

    /// Maximum round index (rounds are numbered from 0)
    recursion_limit: u32,

    retry: RetryPolicy,

    empty_reply_fallback: String,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature: None,
            dispatcher: ToolDispatcher::new(tools),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            retry: RetryPolicy::default(),
            empty_reply_fallback: DEFAULT_EMPTY_REPLY_FALLBACK.to_string(),
        }
    }

    /// Build a loop with every knob taken from configuration.
    pub fn from_config(
        backend: Arc<dyn ChatBackend>,
        tools: Arc<ToolRegistry>,
        config: &toolloop_config::AppConfig,
    ) -> Self {
        let settings = &config.agent;
        let mut agent = Self::new(backend, &config.backend.model, tools)
            .with_recursion_limit(settings.recursion_limit)
            .with_retry_policy(RetryPolicy::from(settings))
            .with_tool_timeout(settings.tool_timeout())
            .with_empty_reply_fallback(&settings.empty_reply_fallback);

        if let Some(t) = config.backend.temperature {
            agent = agent.with_temperature(t);
        }
        if let Some(prompt) = &settings.system_prompt_override {
            agent = agent.with_system_prompt(prompt);
        }
        agent
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Replace the built-in system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum round index.
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the execution bound for tools that don't declare their own.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = self.dispatcher.with_default_timeout(timeout);
        self
    }

    pub fn with_empty_reply_fallback(mut self, text: impl Into<String>) -> Self {
        self.empty_reply_fallback = text.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Answer `user_text` given the prior `history`.
    ///
    /// Never fails: backend and tool problems come back as assistant
    /// messages the user can act on.
    pub async fn run(&self, user_text: &str, history: &[Message]) -> Transcript {
        // A token nobody holds can't be cancelled.
        self.run_with_cancel(user_text, history, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| Transcript::single(e.to_string()))
    }

    /// Like [`AgentLoop::run`], but abandons the run when `cancel` fires.
    ///
    /// The only error returned is [`Error::Cancelled`].
    pub async fn run_with_cancel(
        &self,
        user_text: &str,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Transcript, Error> {
        info!(
            backend = %self.backend.name(),
            model = %self.model,
            history = history.len(),
            "Processing message"
        );

        let tool_definitions = self.dispatcher.registry().definitions();
        let mut conversation: Vec<Message> = history.to_vec();
        conversation.push(Message::user(user_text));
        let mut transcript = Transcript::new();
        let mut depth: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if depth > self.recursion_limit {
                warn!(depth, limit = self.recursion_limit, "Recursion limit reached");
                transcript.push(Message::assistant(RECURSION_LIMIT_MESSAGE));
                return Ok(transcript);
            }

            debug!(depth, messages = conversation.len(), "Agent loop round");

            let health = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                h = self.backend.health_check() => h,
            };
            if let Health::Unreachable { reason } = health {
                error!(endpoint = %self.backend.endpoint(), %reason, "Backend unreachable");
                transcript.push(Message::assistant(self.unreachable_message()));
                return Ok(transcript);
            }

            let mut messages = Vec::with_capacity(conversation.len() + 1);
            messages.push(Message::system(&self.system_prompt));
            messages.extend(conversation.iter().cloned());

            let request = ChatRequest {
                model: self.model.clone(),
                messages,
                tools: tool_definitions.clone(),
                temperature: self.temperature,
            };

            let reply = match with_retry(&self.retry, cancel, "chat", || {
                self.backend.chat(request.clone())
            })
            .await
            {
                Ok(reply) => reply,
                Err(RetryError::Cancelled) => return Err(Error::Cancelled),
                Err(RetryError::Exhausted { attempts, last }) => {
                    error!(attempts, error = %last, "Chat failed after retries");
                    transcript.push(Message::assistant(self.transport_failure_message(&last)));
                    return Ok(transcript);
                }
            };

            let message = reply.message;

            // Tool calls take priority over any text that came with them.
            if !message.has_tool_calls() {
                let content = if message.content.trim().is_empty() {
                    warn!(depth, "Backend reply had neither content nor tool calls");
                    self.empty_reply_fallback.clone()
                } else {
                    message.content
                };
                info!(depth, "Final answer produced");
                transcript.push(Message::assistant(content));
                return Ok(transcript);
            }

            info!(depth, tool_calls = message.tool_calls.len(), "Dispatching tool calls");

            let outcomes = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                o = self.dispatcher.execute(&message.tool_calls) => o,
            };
            let tool_messages = outcomes.to_messages();

            conversation.push(message);
            conversation.extend(tool_messages.iter().cloned());
            for m in tool_messages {
                transcript.push(m);
            }

            depth += 1;
        }
    }

    fn backend_label(&self) -> &'static str {
        match self.backend.name() {
            "ollama" => "Ollama",
            _ => "chat backend",
        }
    }

    fn unreachable_message(&self) -> String {
        let label = self.backend_label();
        format!(
            "I'm unable to connect to the {label} server at {}. Please make sure the {label} service is running and accessible.",
            self.backend.endpoint()
        )
    }

    fn transport_failure_message(&self, error: &ProviderError) -> String {
        format!(
            "I'm having trouble connecting to the AI model. Error: {error}. Please ensure the {} server is running at {} with the model \"{}\" loaded.",
            self.backend_label(),
            self.backend.endpoint(),
            self.model
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use toolloop_core::error::ToolError;
    use toolloop_core::message::{MessageToolCall, Role};
    use toolloop_core::provider::ChatReply;
    use toolloop_core::tool::Tool;

    type Scripted = Result<ChatReply, ProviderError>;

    /// Backend that replays a script, then repeats its last entry.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Scripted>>,
        repeat: Mutex<Option<Scripted>>,
        healthy: bool,
        requests: Mutex<Vec<ChatRequest>>,
        health_checks: Mutex<usize>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                repeat: Mutex::new(script.last().cloned()),
                script: Mutex::new(script.into()),
                healthy: true,
                requests: Mutex::new(Vec::new()),
                health_checks: Mutex::new(0),
            })
        }

        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                repeat: Mutex::new(None),
                healthy: false,
                requests: Mutex::new(Vec::new()),
                health_checks: Mutex::new(0),
            })
        }

        fn chat_calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, i: usize) -> ChatRequest {
            self.requests.lock().unwrap()[i].clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "ollama"
        }

        fn endpoint(&self) -> &str {
            "http://gpu-box:11434"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(reply) => reply,
                None => self
                    .repeat
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| Ok(ChatReply::text("(script exhausted)"))),
            }
        }

        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["qwen3:8b".into()])
        }

        async fn health_check(&self) -> Health {
            *self.health_checks.lock().unwrap() += 1;
            if self.healthy {
                Health::Healthy
            } else {
                Health::Unreachable {
                    reason: "connection refused".into(),
                }
            }
        }
    }

    struct WeatherStub;

    #[async_trait]
    impl Tool for WeatherStub {
        fn name(&self) -> &str {
            "getWeather"
        }
        fn description(&self) -> &str {
            "Weather for a city"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Ok(json!({ "city": arguments["city"], "temperature": 15, "unit": "°C" }))
        }
    }

    struct HangingTool;

    #[async_trait]
    impl Tool for HangingTool {
        fn name(&self) -> &str {
            "hang"
        }
        fn description(&self) -> &str {
            "Never returns"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            std::future::pending().await
        }
    }

    fn tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(WeatherStub)).unwrap();
        registry.register(Box::new(HangingTool)).unwrap();
        Arc::new(registry)
    }

    fn tool_call_reply(calls: Vec<MessageToolCall>) -> Scripted {
        Ok(ChatReply {
            message: Message::assistant_tool_calls("", calls),
            usage: None,
            model: "qwen3:8b".into(),
        })
    }

    fn weather_call(city: &str) -> MessageToolCall {
        MessageToolCall::new(None, "getWeather", json!({ "city": city }))
    }

    fn agent(backend: Arc<ScriptedBackend>) -> AgentLoop {
        AgentLoop::new(backend, "qwen3:8b", tools())
    }

    fn assert_well_formed(transcript: &Transcript) {
        assert!(!transcript.is_empty());
        assert!(transcript.messages.iter().all(|m| !m.content.is_empty()));
        assert_eq!(transcript.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn simple_text_response() {
        let backend = ScriptedBackend::new(vec![Ok(ChatReply::text("Hello! How can I help?"))]);
        let transcript = agent(backend.clone()).run("Hello!", &[]).await;

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages[0].content, "Hello! How can I help?");
        assert_eq!(backend.chat_calls(), 1);

        let request = backend.request(0);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1], Message::user("Hello!"));
        assert_eq!(request.tools.len(), 2);
    }

    #[tokio::test]
    async fn weather_scenario() {
        let backend = ScriptedBackend::new(vec![
            tool_call_reply(vec![weather_call("Warsaw")]),
            Ok(ChatReply::text("It's 15°C in Warsaw")),
        ]);
        let transcript = agent(backend.clone()).run("What's the weather in Warsaw?", &[]).await;

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages[0].role, Role::Tool);
        assert_eq!(transcript.messages[0].tool_name.as_deref(), Some("getWeather"));
        let result: serde_json::Value = serde_json::from_str(&transcript.messages[0].content).unwrap();
        assert_eq!(result["temperature"], 15);
        assert_eq!(transcript.messages[1], Message::assistant("It's 15°C in Warsaw"));

        // Second round sees the tool exchange right after the user message.
        let second = backend.request(1);
        let roles: Vec<_> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert!(second.messages[2].has_tool_calls());
        assert_eq!(
            second.messages.iter().filter(|m| m.role == Role::System).count(),
            1
        );
        assert_eq!(
            second.messages.iter().filter(|m| m.role == Role::User).count(),
            1
        );
        assert_well_formed(&transcript);
    }

    #[tokio::test]
    async fn history_precedes_new_user_message() {
        let backend = ScriptedBackend::new(vec![Ok(ChatReply::text("Still 15°C."))]);
        let history = vec![
            Message::user("Weather in Warsaw?"),
            Message::assistant("It's 15°C in Warsaw"),
        ];
        agent(backend.clone()).run("And now?", &history).await;

        let request = backend.request(0);
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[1], history[0]);
        assert_eq!(request.messages[2], history[1]);
        assert_eq!(request.messages[3], Message::user("And now?"));
    }

    #[tokio::test]
    async fn unreachable_backend_short_circuits() {
        let backend = ScriptedBackend::unreachable();
        let transcript = agent(backend.clone()).run("hi", &[]).await;

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages[0].role, Role::Assistant);
        assert!(transcript.messages[0].content.contains("http://gpu-box:11434"));
        assert_eq!(backend.chat_calls(), 0);
    }

    #[tokio::test]
    async fn endless_tool_calls_hit_the_limit() {
        let backend = ScriptedBackend::new(vec![tool_call_reply(vec![weather_call("Oslo")])]);
        let transcript = agent(backend.clone()).run("loop forever", &[]).await;

        // Rounds 0..=10 each call the backend once; round 11 is refused.
        assert_eq!(backend.chat_calls(), 11);
        assert_eq!(*backend.health_checks.lock().unwrap(), 11);
        assert_eq!(transcript.len(), 12);
        assert_eq!(transcript.last().unwrap().content, RECURSION_LIMIT_MESSAGE);
        assert!(transcript.messages[..11].iter().all(|m| m.role == Role::Tool));
        assert_well_formed(&transcript);
    }

    #[tokio::test]
    async fn zero_limit_allows_one_round() {
        let backend = ScriptedBackend::new(vec![tool_call_reply(vec![weather_call("Oslo")])]);
        let transcript = agent(backend.clone())
            .with_recursion_limit(0)
            .run("hi", &[])
            .await;

        assert_eq!(backend.chat_calls(), 1);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().unwrap().content, RECURSION_LIMIT_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_chat_is_retried_then_reported() {
        let backend = ScriptedBackend::new(vec![Err(ProviderError::Network(
            "connection reset by peer".into(),
        ))]);
        let transcript = agent(backend.clone()).run("hi", &[]).await;

        assert_eq!(backend.chat_calls(), 3);
        assert_eq!(transcript.len(), 1);
        let text = &transcript.messages[0].content;
        assert!(text.contains("connection reset by peer"));
        assert!(text.contains("http://gpu-box:11434"));
        assert!(text.contains("\"qwen3:8b\""));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers() {
        let backend = ScriptedBackend::new(vec![
            Err(ProviderError::ApiError {
                status_code: 503,
                message: "loading".into(),
            }),
            Ok(ChatReply::text("ready now")),
        ]);
        let transcript = agent(backend.clone()).run("hi", &[]).await;
        assert_eq!(backend.chat_calls(), 2);
        assert_eq!(transcript.messages[0].content, "ready now");
    }

    #[tokio::test]
    async fn unknown_tool_does_not_sink_the_round() {
        let backend = ScriptedBackend::new(vec![
            tool_call_reply(vec![
                MessageToolCall::new(Some("a".into()), "getWeather", json!({"city": "Rome"})),
                MessageToolCall::new(Some("b".into()), "teleport", json!({})),
                MessageToolCall::new(Some("c".into()), "getWeather", json!(r#"{"city":"Paris"}"#)),
            ]),
            Ok(ChatReply::text("Rome and Paris are both mild.")),
        ]);
        let transcript = agent(backend).run("compare", &[]).await;

        assert_eq!(transcript.len(), 4);
        let ids: Vec<_> = transcript.messages[..3]
            .iter()
            .map(|m| m.tool_call_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(transcript.messages[1].content, r#"{"error":"Tool not found"}"#);
        assert!(transcript.messages[2].content.contains("Paris"));
    }

    #[tokio::test]
    async fn empty_reply_uses_fallback() {
        let backend = ScriptedBackend::new(vec![Ok(ChatReply::text(""))]);
        let transcript = agent(backend).run("hi", &[]).await;
        assert_eq!(transcript.messages[0].content, DEFAULT_EMPTY_REPLY_FALLBACK);

        let backend = ScriptedBackend::new(vec![Ok(ChatReply::text("  "))]);
        let transcript = agent(backend)
            .with_empty_reply_fallback("Say that again?")
            .run("hi", &[])
            .await;
        assert_eq!(transcript.messages[0].content, "Say that again?");
    }

    #[tokio::test]
    async fn tool_calls_win_over_content() {
        let backend = ScriptedBackend::new(vec![
            Ok(ChatReply {
                message: Message::assistant_tool_calls("Let me check.", vec![weather_call("Lima")]),
                usage: None,
                model: String::new(),
            }),
            Ok(ChatReply::text("Lima is warm.")),
        ]);
        let transcript = agent(backend.clone()).run("Lima?", &[]).await;
        assert_eq!(backend.chat_calls(), 2);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages[0].role, Role::Tool);
    }

    #[tokio::test]
    async fn custom_system_prompt_and_temperature() {
        let backend = ScriptedBackend::new(vec![Ok(ChatReply::text("ok"))]);
        agent(backend.clone())
            .with_system_prompt("Be brief.")
            .with_temperature(0.3)
            .run("hi", &[])
            .await;
        let request = backend.request(0);
        assert_eq!(request.messages[0], Message::system("Be brief."));
        assert_eq!(request.temperature, Some(0.3));
    }

    #[tokio::test]
    async fn already_cancelled_token_returns_error() {
        let backend = ScriptedBackend::new(vec![Ok(ChatReply::text("never"))]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = agent(backend.clone()).run_with_cancel("hi", &[], &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(backend.chat_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_running_tools() {
        let backend = ScriptedBackend::new(vec![tool_call_reply(vec![MessageToolCall::new(
            None,
            "hang",
            json!({}),
        )])]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let result = agent(backend.clone()).run_with_cancel("hang please", &[], &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(backend.chat_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_tool_times_out_and_loop_continues() {
        let backend = ScriptedBackend::new(vec![
            tool_call_reply(vec![MessageToolCall::new(None, "hang", json!({}))]),
            Ok(ChatReply::text("That tool is stuck, sorry.")),
        ]);
        let transcript = agent(backend)
            .with_tool_timeout(Duration::from_secs(2))
            .run("hang please", &[])
            .await;

        assert_eq!(transcript.len(), 2);
        assert!(transcript.messages[0].content.contains("Tool timed out: hang after 2000ms"));
        assert_eq!(transcript.messages[1].content, "That tool is stuck, sorry.");
    }

    #[test]
    fn from_config_applies_settings() {
        let mut config = toolloop_config::AppConfig::default();
        config.backend.model = "llama3.2".into();
        config.backend.temperature = Some(0.1);
        config.agent.recursion_limit = 3;
        config.agent.system_prompt_override = Some("Custom".into());

        let backend = ScriptedBackend::new(vec![]);
        let agent = AgentLoop::from_config(backend, tools(), &config);
        assert_eq!(agent.model(), "llama3.2");
        assert_eq!(agent.recursion_limit, 3);
        assert_eq!(agent.temperature, Some(0.1));
        assert_eq!(agent.system_prompt, "Custom");
        assert_eq!(agent.retry, RetryPolicy::new(3, Duration::from_secs(1)));
    }
}
