//! Note tools — write, read, list and search short notes.
//!
//! All four tools share one [`NoteStore`]. The store is owned by whoever
//! builds the registry and lives for the whole process, so notes written in
//! one request are visible to the next. Titles match case-insensitively.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use toolloop_core::error::ToolError;
use toolloop_core::tool::Tool;

/// Characters of content shown per search hit.
const SNIPPET_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory note storage, cheap to clone and safe to share across tasks.
#[derive(Debug, Clone, Default)]
pub struct NoteStore {
    notes: Arc<RwLock<HashMap<String, Note>>>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(title: &str) -> String {
        title.trim().to_lowercase()
    }

    /// Insert or replace a note. Returns `true` when the title was new.
    pub async fn write(&self, title: &str, content: &str) -> bool {
        let now = Utc::now();
        let mut notes = self.notes.write().await;
        match notes.get_mut(&Self::key(title)) {
            Some(note) => {
                note.content = content.to_string();
                note.updated_at = now;
                false
            }
            None => {
                notes.insert(
                    Self::key(title),
                    Note {
                        title: title.trim().to_string(),
                        content: content.to_string(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                true
            }
        }
    }

    pub async fn read(&self, title: &str) -> Option<Note> {
        self.notes.read().await.get(&Self::key(title)).cloned()
    }

    /// All notes, most recently updated first.
    pub async fn list(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self.notes.read().await.values().cloned().collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.title.cmp(&b.title)));
        notes
    }

    /// Notes whose title or content contains `query`, ignoring case.
    pub async fn search(&self, query: &str) -> Vec<Note> {
        let needle = query.to_lowercase();
        self.list()
            .await
            .into_iter()
            .filter(|n| {
                n.title.to_lowercase().contains(&needle) || n.content.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.notes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notes.read().await.is_empty()
    }
}

fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    match arguments[key].as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ToolError::InvalidArguments(format!("'{key}' must not be empty"))),
    }
}

pub struct WriteNoteTool {
    store: NoteStore,
}

impl WriteNoteTool {
    pub fn new(store: NoteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for WriteNoteTool {
    fn name(&self) -> &str {
        "writeNote"
    }

    fn description(&self) -> &str {
        "Save a note with the specified title and content. If the note already exists, it will be updated."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Title of the note to save" },
                "content": { "type": "string", "description": "Content of the note to save" }
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let title = required_str(&arguments, "title")?;
        let content = arguments["content"].as_str().unwrap_or_default();
        let is_new = self.store.write(title, content).await;

        Ok(serde_json::json!({
            "success": true,
            "message": format!("Note '{title}' saved successfully"),
            "title": title,
            "isNew": is_new,
        }))
    }
}

pub struct ReadNoteTool {
    store: NoteStore,
}

impl ReadNoteTool {
    pub fn new(store: NoteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadNoteTool {
    fn name(&self) -> &str {
        "readNote"
    }

    fn description(&self) -> &str {
        "Read a note's content by its title"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Title of the note to read" }
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let title = required_str(&arguments, "title")?;

        // A missing note is an answer, not a tool failure.
        Ok(match self.store.read(title).await {
            Some(note) => serde_json::json!({
                "success": true,
                "message": format!("Note '{}' retrieved successfully", note.title),
                "note": note,
            }),
            None => serde_json::json!({
                "success": false,
                "message": format!("Note '{title}' not found"),
                "title": title,
            }),
        })
    }
}

pub struct ListNotesTool {
    store: NoteStore,
}

impl ListNotesTool {
    pub fn new(store: NoteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "listNotes"
    }

    fn description(&self) -> &str {
        "List the titles of all saved notes, most recently updated first"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let notes = self.store.list().await;
        let titles: Vec<_> = notes
            .iter()
            .map(|n| serde_json::json!({ "title": n.title, "updatedAt": n.updated_at }))
            .collect();

        Ok(serde_json::json!({
            "success": true,
            "count": titles.len(),
            "notes": titles,
        }))
    }
}

pub struct SearchNotesTool {
    store: NoteStore,
}

impl SearchNotesTool {
    pub fn new(store: NoteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "searchNotes"
    }

    fn description(&self) -> &str {
        "Search for notes by content or title"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Text to find in note titles or content" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let query = required_str(&arguments, "query")?;
        let hits = self.store.search(query).await;

        if hits.is_empty() {
            return Ok(serde_json::json!({
                "success": false,
                "message": format!("No notes found matching '{query}'"),
                "query": query,
            }));
        }

        let notes: Vec<_> = hits
            .iter()
            .map(|n| {
                let snippet = if n.content.chars().count() > SNIPPET_CHARS {
                    format!("{}...", n.content.chars().take(SNIPPET_CHARS).collect::<String>())
                } else {
                    n.content.clone()
                };
                serde_json::json!({ "title": n.title, "snippet": snippet, "updatedAt": n.updated_at })
            })
            .collect();

        Ok(serde_json::json!({
            "success": true,
            "message": format!("Found {} notes matching '{query}'", notes.len()),
            "notes": notes,
            "query": query,
        }))
    }
}
