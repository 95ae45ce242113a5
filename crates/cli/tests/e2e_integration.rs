//! End-to-end integration tests for the Toolloop agent loop.
//!
//! These tests run the full pipeline from user input to transcript with the
//! real built-in tools and a scripted backend standing in for the model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use toolloop_agent::{AgentLoop, RECURSION_LIMIT_MESSAGE};
use toolloop_config::AppConfig;
use toolloop_core::error::ProviderError;
use toolloop_core::message::{Message, MessageToolCall, Role};
use toolloop_core::provider::{ChatBackend, ChatReply, ChatRequest};
use toolloop_tools::{NoteStore, default_registry};

// ── Mock Backend ─────────────────────────────────────────────────────────

/// A backend that replays scripted replies, repeating the last one.
struct ScriptedBackend {
    replies: Mutex<VecDeque<ChatReply>>,
    last: Mutex<Option<ChatReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<ChatReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> ChatRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn endpoint(&self) -> &str {
        "http://localhost:11434"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone()
            .ok_or_else(|| ProviderError::InvalidResponse("empty script".into()))
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["qwen3:8b".into()])
    }
}

fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> ChatReply {
    let calls = calls
        .into_iter()
        .enumerate()
        .map(|(i, (name, args))| MessageToolCall::new(Some(format!("call_{i}")), name, args))
        .collect();
    ChatReply {
        message: Message::assistant_tool_calls("", calls),
        usage: None,
        model: "qwen3:8b".into(),
    }
}

fn agent(backend: Arc<ScriptedBackend>, notes: &NoteStore) -> AgentLoop {
    let tools = Arc::new(default_registry(&[], notes).unwrap());
    AgentLoop::new(backend, "qwen3:8b", tools)
}

fn tool_content(message: &Message) -> serde_json::Value {
    assert_eq!(message.role, Role::Tool);
    serde_json::from_str(&message.content).unwrap()
}

// ── E2E: weather round trip ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_weather_tool_then_answer() {
    let backend = ScriptedBackend::new(vec![
        tool_calls(vec![("getWeather", serde_json::json!({"city": "Paris"}))]),
        ChatReply::text("It is mild in Paris today."),
    ]);
    let agent = agent(backend.clone(), &NoteStore::new());

    let transcript = agent.run("What's the weather in Paris?", &[]).await;

    assert_eq!(transcript.len(), 2);
    let weather = tool_content(&transcript.messages[0]);
    assert_eq!(weather["city"], "Paris");
    assert_eq!(weather["unit"], "°C");
    assert_eq!(transcript.messages[0].tool_name.as_deref(), Some("getWeather"));
    assert_eq!(transcript.messages[1].content, "It is mild in Paris today.");

    // Second request carries the tool call and its result back to the model.
    assert_eq!(backend.calls(), 2);
    let second = backend.request(1);
    let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::Tool]
    );
    assert!(second.messages[2].has_tool_calls());
}

// ── E2E: notes persist across runs ───────────────────────────────────────

#[tokio::test]
async fn e2e_notes_survive_between_runs() {
    let notes = NoteStore::new();

    let writer = ScriptedBackend::new(vec![
        tool_calls(vec![(
            "writeNote",
            serde_json::json!({"title": "Trip", "content": "Book train to Lyon"}),
        )]),
        ChatReply::text("Saved."),
    ]);
    let transcript = agent(writer, &notes).run("Remember my trip plan", &[]).await;
    assert_eq!(tool_content(&transcript.messages[0])["isNew"], true);

    let reader = ScriptedBackend::new(vec![
        tool_calls(vec![("readNote", serde_json::json!({"title": "trip"}))]),
        ChatReply::text("You planned to book a train to Lyon."),
    ]);
    let transcript = agent(reader, &notes).run("What was my trip plan?", &[]).await;

    let read = tool_content(&transcript.messages[0]);
    assert_eq!(read["success"], true);
    assert_eq!(read["note"]["content"], "Book train to Lyon");
    assert_eq!(notes.len().await, 1);
}

// ── E2E: several calls in one round ──────────────────────────────────────

#[tokio::test]
async fn e2e_parallel_calls_keep_request_order() {
    let backend = ScriptedBackend::new(vec![
        tool_calls(vec![
            (
                "summarizeText",
                serde_json::json!({"text": "<think>hmm</think>  Short   note. "}),
            ),
            ("getWeather", serde_json::json!({"city": "Oslo", "units": "imperial"})),
            ("launchRocket", serde_json::json!({})),
        ]),
        ChatReply::text("Done."),
    ]);
    let agent = agent(backend.clone(), &NoteStore::new());

    let transcript = agent.run("do three things", &[]).await;

    assert_eq!(transcript.len(), 4);
    assert_eq!(tool_content(&transcript.messages[0])["summary"], "Short note.");
    assert_eq!(tool_content(&transcript.messages[1])["unit"], "°F");
    assert_eq!(
        tool_content(&transcript.messages[2])["error"],
        "Tool not found"
    );
    let ids: Vec<_> = transcript.messages[..3]
        .iter()
        .map(|m| m.tool_call_id.clone())
        .collect();
    assert_eq!(
        ids,
        vec![
            Some("call_0".to_string()),
            Some("call_1".to_string()),
            Some("call_2".to_string())
        ]
    );
    assert_eq!(transcript.messages[3].content, "Done.");
}

// ── E2E: invalid arguments are reported to the model ─────────────────────

#[tokio::test]
async fn e2e_invalid_arguments_become_tool_error() {
    let backend = ScriptedBackend::new(vec![
        tool_calls(vec![("getWeather", serde_json::json!({"town": "Rome"}))]),
        ChatReply::text("Which city did you mean?"),
    ]);
    let agent = agent(backend, &NoteStore::new());

    let transcript = agent.run("weather?", &[]).await;

    let error = tool_content(&transcript.messages[0]);
    assert!(error["error"].as_str().unwrap().contains("city"));
    assert_eq!(transcript.last().unwrap().content, "Which city did you mean?");
}

// ── E2E: recursion limit with real tools ─────────────────────────────────

#[tokio::test]
async fn e2e_model_stuck_on_tools_hits_limit() {
    let backend = ScriptedBackend::new(vec![tool_calls(vec![(
        "listNotes",
        serde_json::json!({}),
    )])]);
    let agent = agent(backend.clone(), &NoteStore::new());

    let transcript = agent.run("list forever", &[]).await;

    assert_eq!(backend.calls(), 11);
    assert_eq!(transcript.len(), 12);
    assert_eq!(transcript.last().unwrap().content, RECURSION_LIMIT_MESSAGE);
}

// ── E2E: config drives catalog and prompt ────────────────────────────────

#[tokio::test]
async fn e2e_config_disables_tools_and_overrides_prompt() {
    let mut config = AppConfig::default();
    config.tools.disabled = vec!["scraperLink".into(), "searchNotes".into()];
    config.agent.system_prompt_override = Some("Answer in one word.".into());
    config.backend.temperature = Some(0.2);

    let notes = NoteStore::new();
    let tools = Arc::new(default_registry(&config.tools.disabled, &notes).unwrap());
    let backend = ScriptedBackend::new(vec![ChatReply::text("Sunny.")]);
    let agent = AgentLoop::from_config(backend.clone(), tools, &config);

    let transcript = agent.run("weather?", &[]).await;
    assert_eq!(transcript.last().unwrap().content, "Sunny.");

    let request = backend.request(0);
    let names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["getWeather", "summarizeText", "writeNote", "readNote", "listNotes"]
    );
    assert_eq!(request.messages[0].content, "Answer in one word.");
    assert_eq!(request.temperature, Some(0.2));
    assert_eq!(request.model, config.backend.model);
}

// ── E2E: history is forwarded ahead of the new message ───────────────────

#[tokio::test]
async fn e2e_history_precedes_user_message() {
    let backend = ScriptedBackend::new(vec![ChatReply::text("Still sunny.")]);
    let agent = agent(backend.clone(), &NoteStore::new());
    let history = vec![
        Message::user("weather in Rome?"),
        Message::assistant("Sunny in Rome."),
    ];

    agent.run("and tomorrow?", &history).await;

    let request = backend.request(0);
    assert_eq!(request.messages.len(), 4);
    assert_eq!(request.messages[1].content, "weather in Rome?");
    assert_eq!(request.messages[3].content, "and tomorrow?");
    assert_eq!(
        request.messages.iter().filter(|m| m.role == Role::System).count(),
        1
    );
}
