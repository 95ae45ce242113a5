//! Chat backend implementations for Toolloop.
//!
//! All backends implement the `toolloop_core::ChatBackend` trait.
//! The router selects the correct backend based on configuration.

mod http;
pub mod ollama;
pub mod openai_compat;
pub mod router;

pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use router::build_from_config;
