//! Backend router — selects the chat backend based on config.

use std::sync::Arc;
use toolloop_config::{BackendConfig, BackendKind};
use toolloop_core::error::ProviderError;
use toolloop_core::provider::ChatBackend;
use tracing::info;

use crate::ollama::OllamaBackend;
use crate::openai_compat::OpenAiCompatBackend;

/// Build the configured backend.
pub fn build_from_config(config: &BackendConfig) -> Result<Arc<dyn ChatBackend>, ProviderError> {
    let timeout = config.request_timeout();

    let backend: Arc<dyn ChatBackend> = match config.kind {
        BackendKind::Ollama => Arc::new(OllamaBackend::new(&config.endpoint, timeout)?),
        BackendKind::OpenAi => {
            let api_key = config.api_key.clone().unwrap_or_default();
            Arc::new(OpenAiCompatBackend::new(
                "openai",
                &config.endpoint,
                api_key,
                timeout,
            )?)
        }
    };

    info!(backend = %backend.name(), endpoint = %backend.endpoint(), model = %config.model, "Chat backend ready");
    Ok(backend)
}
