//! Tool dispatcher — runs the tool calls of one assistant reply.
//!
//! Every request yields exactly one outcome, in request order. An unknown
//! name, bad arguments, a handler error, a panic or a timeout never escapes as an
//! error: it becomes a [`ToolOutcome::Failure`] reported back to the model
//! in place of a result.

use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use toolloop_core::error::ToolError;
use toolloop_core::message::{Message, MessageToolCall};
use toolloop_core::tool::{ToolFailure, ToolOutcome, ToolRegistry};
use tracing::{debug, warn};

/// Per-call bound for tools that don't declare their own.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// The outcome of one request, tagged with what it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub call_id: Option<String>,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl DispatchOutcome {
    /// The `tool` message carrying this outcome.
    pub fn to_message(&self) -> Message {
        Message::tool_result(self.call_id.clone(), &self.tool_name, self.outcome.to_content())
    }
}

/// All outcomes of one dispatch, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcomes {
    entries: Vec<DispatchOutcome>,
}

impl DispatchOutcomes {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DispatchOutcome> {
        self.entries.iter()
    }

    /// First outcome for the named tool.
    pub fn get(&self, tool_name: &str) -> Option<&ToolOutcome> {
        self.entries
            .iter()
            .find(|e| e.tool_name == tool_name)
            .map(|e| &e.outcome)
    }

    /// Tool messages in request order.
    pub fn to_messages(&self) -> Vec<Message> {
        self.entries.iter().map(DispatchOutcome::to_message).collect()
    }
}

impl IntoIterator for DispatchOutcomes {
    type Item = DispatchOutcome;
    type IntoIter = std::vec::IntoIter<DispatchOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    default_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run every request concurrently and collect the outcomes in request order.
    pub async fn execute(&self, requests: &[MessageToolCall]) -> DispatchOutcomes {
        let entries = join_all(requests.iter().map(|call| async move {
            DispatchOutcome {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                outcome: self.execute_one(call).await,
            }
        }))
        .await;

        DispatchOutcomes { entries }
    }

    async fn execute_one(&self, call: &MessageToolCall) -> ToolOutcome {
        let raw = call.raw_arguments();

        match self.try_execute(call).await {
            Ok(value) => ToolOutcome::Success(value),
            Err(error) => {
                warn!(tool = %call.name, error = %error, "Tool call failed");
                ToolOutcome::Failure(ToolFailure::from_error(&error, &call.name, &raw))
            }
        }
    }

    async fn try_execute(&self, call: &MessageToolCall) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let arguments = parse_arguments(&call.arguments)?;
        validate_arguments(&tool.parameters_schema(), &arguments)?;

        let limit = tool.timeout().unwrap_or(self.default_timeout);
        let start = Instant::now();

        let guarded = AssertUnwindSafe(tool.execute(arguments)).catch_unwind();
        let result = tokio::time::timeout(limit, guarded)
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_ms: limit.as_millis() as u64,
            })?
            .map_err(|panic| {
                ToolError::failed(&call.name, format!("tool panicked: {}", panic_message(&panic)))
            })?;

        debug!(
            tool = %call.name,
            success = result.is_ok(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool executed"
        );
        result
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Turn wire arguments into a JSON object. An empty string or null means
/// "no arguments".
pub fn parse_arguments(arguments: &Value) -> Result<Value, ToolError> {
    let parsed = match arguments {
        Value::Null => Value::Object(Default::default()),
        Value::String(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))?,
        other => other.clone(),
    };

    if !parsed.is_object() {
        return Err(ToolError::InvalidArguments(
            "arguments must be a JSON object".into(),
        ));
    }
    Ok(parsed)
}

/// Check `arguments` against the subset of JSON Schema tools declare:
/// required keys and the primitive `type` of each declared property.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), ToolError> {
    let required: Vec<&str> = schema["required"]
        .as_array()
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for key in &required {
        if arguments.get(*key).is_none_or(Value::is_null) {
            return Err(ToolError::InvalidArguments(format!(
                "missing required argument '{key}'"
            )));
        }
    }

    let Some(properties) = schema["properties"].as_object() else {
        return Ok(());
    };

    for (key, property) in properties {
        let Some(value) = arguments.get(key) else {
            continue;
        };
        if value.is_null() && !required.contains(&key.as_str()) {
            continue;
        }

        let accepted: Vec<&str> = match &property["type"] {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => continue,
        };

        if !accepted.iter().any(|t| matches_type(t, value)) {
            return Err(ToolError::InvalidArguments(format!(
                "argument '{key}' must be of type {}",
                accepted.join(" | ")
            )));
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type keywords are not ours to reject.
        _ => true,
    }
}
