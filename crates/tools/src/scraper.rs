//! Link scraper: fetches a web page and returns a readable text excerpt.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;
use toolloop_core::error::ToolError;
use toolloop_core::tool::Tool;
use tracing::debug;

/// Bytes read from the response before the body is cut off.
const MAX_BODY_BYTES: usize = 512 * 1024;

/// Characters of page text returned to the model.
const MAX_EXCERPT_CHARS: usize = 2_000;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static NON_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head)[^>]*>.*?</(script|style|noscript|head)>")
        .expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

pub struct ScraperLinkTool {
    client: reqwest::Client,
}

impl ScraperLinkTool {
    pub fn new() -> toolloop_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("toolloop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| toolloop_core::Error::Config {
                message: format!("failed to build HTTP client for scraperLink: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageExcerpt {
    url: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    excerpt: String,
    truncated: bool,
}

#[async_trait]
impl Tool for ScraperLinkTool {
    fn name(&self) -> &str {
        "scraperLink"
    }

    fn description(&self) -> &str {
        "Fetch a web page by URL and return its title and a plain-text excerpt of its content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http:// or https:// URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    fn timeout(&self) -> Option<Duration> {
        Some(FETCH_TIMEOUT + Duration::from_secs(5))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let raw = arguments["url"].as_str().unwrap_or_default().trim();
        if raw.is_empty() {
            return Err(ToolError::InvalidArguments("URL is required".into()));
        }

        let url = reqwest::Url::parse(raw)
            .map_err(|_| ToolError::InvalidArguments("Invalid URL format".into()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        debug!(%url, "Fetching link");

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(
                self.name(),
                format!("Fetching {url} returned HTTP {status}"),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to read {url}: {e}")))?
        {
            body.extend_from_slice(&chunk);
            if body.len() >= MAX_BODY_BYTES {
                body.truncate(MAX_BODY_BYTES);
                break;
            }
        }

        let html = String::from_utf8_lossy(&body);
        let (title, text) = extract_text(&html);
        let truncated = text.chars().count() > MAX_EXCERPT_CHARS;
        let excerpt = text.chars().take(MAX_EXCERPT_CHARS).collect();

        let page = PageExcerpt {
            url: url.to_string(),
            status: status.as_u16(),
            content_type,
            title,
            excerpt,
            truncated,
        };
        serde_json::to_value(&page).map_err(|e| ToolError::failed(self.name(), e.to_string()))
    }
}

/// Pull the `<title>` and the visible text out of an HTML document.
/// Plain-text bodies pass through with whitespace collapsed.
fn extract_text(html: &str) -> (Option<String>, String) {
    let title = TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| collapse(m.as_str()))
        .filter(|t| !t.is_empty());

    let text = NON_TEXT.replace_all(html, " ");
    let text = TAG.replace_all(&text, " ");
    (title, collapse(&text))
}

fn collapse(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}
