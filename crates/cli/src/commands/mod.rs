pub mod chat;
pub mod doctor;
pub mod init;
pub mod serve;
pub mod tools;

use std::sync::Arc;
use toolloop_agent::AgentLoop;
use toolloop_config::AppConfig;

/// Load the config file, pointing at `toolloop init` when it is broken.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| {
        format!(
            "Failed to load config: {e}\n  (fix {} or run `toolloop init --force`)",
            AppConfig::config_dir().join("config.toml").display()
        )
        .into()
    })
}

/// Wire backend, tools and agent from config.
pub fn build_agent(config: &AppConfig) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let backend = toolloop_providers::build_from_config(&config.backend)?;
    let notes = toolloop_tools::NoteStore::new();
    let tools = Arc::new(toolloop_tools::default_registry(
        &config.tools.disabled,
        &notes,
    )?);
    tracing::debug!(
        backend = %config.backend.kind,
        model = %config.backend.model,
        tools = tools.len(),
        "Agent wired"
    );
    Ok(AgentLoop::from_config(backend, tools, config))
}
