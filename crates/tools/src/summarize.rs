//! Cleans model output and clamps it to a length budget.
//!
//! Reasoning models leak `<think>…</think>` blocks and stray markup into text
//! they hand to tools. This tool strips both, collapses whitespace and, when
//! the result is still too long, cuts it to `maxLength` characters ending in
//! `...`.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use toolloop_core::error::ToolError;
use toolloop_core::tool::Tool;

/// Default length budget in characters.
pub const DEFAULT_MAX_LENGTH: usize = 280;

const ELLIPSIS: &str = "...";

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
static UNCLOSED_THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

pub struct SummarizeTextTool;

#[async_trait]
impl Tool for SummarizeTextTool {
    fn name(&self) -> &str {
        "summarizeText"
    }

    fn description(&self) -> &str {
        "Summarize a piece of text so it fits within maxLength characters (default 280). \
         Removes <think> blocks and markup."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The original text to summarize"
                },
                "maxLength": {
                    "type": "integer",
                    "description": "Maximum summary length in characters"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let text = arguments["text"].as_str().unwrap_or_default();
        let max_length = max_length_argument(arguments.get("maxLength"))?;

        let summary = summarize(text, max_length);
        serde_json::to_value(&summary).map_err(|e| ToolError::failed(self.name(), e.to_string()))
    }
}

/// Read `maxLength`, accepting whole-number floats such as `20.0`.
fn max_length_argument(value: Option<&serde_json::Value>) -> Result<usize, ToolError> {
    let Some(n) = value.filter(|v| !v.is_null()).map(|v| v.as_f64()) else {
        return Ok(DEFAULT_MAX_LENGTH);
    };
    let n = n.ok_or_else(|| ToolError::InvalidArguments("maxLength must be a number".into()))?;

    if n.fract() != 0.0 || n < 0.0 {
        return Err(ToolError::InvalidArguments(format!(
            "maxLength must be a non-negative integer, got {n}"
        )));
    }
    if n <= ELLIPSIS.len() as f64 {
        return Err(ToolError::InvalidArguments(format!(
            "maxLength must be greater than {}",
            ELLIPSIS.len()
        )));
    }
    Ok(n as usize)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub summary: String,
    pub shortened: bool,
    pub original_length: usize,
    pub summary_length: usize,
}

/// Remove reasoning blocks and tags, then collapse runs of whitespace.
pub fn clean(text: &str) -> String {
    let text = THINK_BLOCK.replace_all(text, "");
    let text = UNCLOSED_THINK.replace_all(&text, "");
    let text = TAG.replace_all(&text, "");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Clean `text` and clamp it to `max_length` characters.
pub fn summarize(text: &str, max_length: usize) -> Summary {
    let cleaned = clean(text);
    let original_length = cleaned.chars().count();

    if original_length <= max_length {
        return Summary {
            summary_length: original_length,
            summary: cleaned,
            shortened: false,
            original_length,
        };
    }

    let keep = max_length.saturating_sub(ELLIPSIS.len());
    let mut summary: String = cleaned.chars().take(keep).collect();
    summary.truncate(summary.trim_end().len());
    summary.push_str(ELLIPSIS);

    Summary {
        summary_length: summary.chars().count(),
        summary,
        shortened: true,
        original_length,
    }
}
