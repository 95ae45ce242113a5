//! Built-in tool implementations for Toolloop.
//!
//! Tools give the agent the ability to act: check the weather, tidy up and
//! shorten text, fetch a web page, and keep notes between turns.

pub mod notes;
pub mod scraper;
pub mod summarize;
pub mod weather;

use toolloop_core::tool::{Tool, ToolRegistry};
use tracing::{debug, info};

pub use notes::NoteStore;

/// Every built-in tool, in catalog order.
pub fn builtin_tools(notes: &NoteStore) -> toolloop_core::Result<Vec<Box<dyn Tool>>> {
    Ok(vec![
        Box::new(weather::GetWeatherTool),
        Box::new(summarize::SummarizeTextTool),
        Box::new(scraper::ScraperLinkTool::new()?),
        Box::new(notes::WriteNoteTool::new(notes.clone())),
        Box::new(notes::ReadNoteTool::new(notes.clone())),
        Box::new(notes::ListNotesTool::new(notes.clone())),
        Box::new(notes::SearchNotesTool::new(notes.clone())),
    ])
}

/// Create the default tool registry, leaving out any tool named in `disabled`.
///
/// The note store is passed in so the caller keeps ownership of the notes
/// for the lifetime of the process.
pub fn default_registry(
    disabled: &[String],
    notes: &NoteStore,
) -> toolloop_core::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    for tool in builtin_tools(notes)? {
        if disabled.iter().any(|d| d == tool.name()) {
            debug!(tool = %tool.name(), "Tool disabled by configuration");
            continue;
        }
        registry.register(tool)?;
    }

    info!(tools = registry.len(), "Tool registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_tools() {
        let registry = default_registry(&[], &NoteStore::new()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "getWeather",
                "summarizeText",
                "scraperLink",
                "writeNote",
                "readNote",
                "listNotes",
                "searchNotes"
            ]
        );
    }

    #[test]
    fn disabled_tools_are_skipped() {
        let registry =
            default_registry(&["scraperLink".to_string()], &NoteStore::new()).unwrap();
        assert!(registry.get("scraperLink").is_none());
        assert!(registry.get("getWeather").is_some());
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn every_schema_is_an_object() {
        let registry = default_registry(&[], &NoteStore::new()).unwrap();
        for def in registry.definitions() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }

    #[tokio::test]
    async fn notes_survive_across_registries() {
        let notes = NoteStore::new();
        let first = default_registry(&[], &notes).unwrap();
        first
            .get("writeNote")
            .unwrap()
            .execute(serde_json::json!({"title": "shared", "content": "yes"}))
            .await
            .unwrap();

        let second = default_registry(&[], &notes).unwrap();
        let out = second
            .get("readNote")
            .unwrap()
            .execute(serde_json::json!({"title": "shared"}))
            .await
            .unwrap();
        assert_eq!(out["note"]["content"], "yes");
    }
}
