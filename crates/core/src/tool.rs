//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let the model act: look up the weather, fetch a link,
//! keep notes. Each tool advertises a name, a description and a JSON schema
//! for its parameters, and owns an async handler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use crate::error::{Error, ToolError};
use crate::provider::ToolDefinition;

/// The core Tool trait.
///
/// Handlers receive arguments that were already parsed and checked against
/// [`Tool::parameters_schema`]. Shared resources a tool touches (stores,
/// HTTP clients) must be internally synchronized; the registry hands out
/// shared references to tools from concurrent requests.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "getWeather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<serde_json::Value, ToolError>;

    /// Per-tool execution bound. `None` uses the dispatcher default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Built once at startup, then shared read-only behind an `Arc`.
/// Iteration follows registration order so the catalog sent to the
/// backend is stable between rounds.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. A second tool with the same name is a configuration
    /// error.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> crate::Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// Get all tool definitions (for sending to the LLM), in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Structured error reported back to the model in place of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolFailure {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolFailure {
    /// Build the failure record for a call that went wrong.
    ///
    /// An unknown tool yields the bare `{"error": "Tool not found"}` object;
    /// everything else names the tool and echoes the raw arguments.
    pub fn from_error(error: &ToolError, tool_name: &str, raw_arguments: &str) -> Self {
        match error {
            ToolError::NotFound(_) => Self {
                error: error.to_string(),
                tool_name: None,
                arguments: None,
            },
            _ => Self {
                error: error.to_string(),
                tool_name: Some(tool_name.to_string()),
                arguments: Some(raw_arguments.to_string()),
            },
        }
    }
}

/// The result of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Failure(ToolFailure),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    /// Serialized form used as the content of a `tool` message.
    pub fn to_content(&self) -> String {
        match self {
            ToolOutcome::Success(value) => value.to_string(),
            ToolOutcome::Failure(failure) => serde_json::to_string(failure)
                .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, failure.error.escape_default())),
        }
    }
}
