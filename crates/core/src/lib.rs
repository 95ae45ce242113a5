//! # Toolloop Core
//!
//! Domain types, traits, and error definitions for the Toolloop agent runtime.
//! This crate has **no framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! Every seam of the agent loop is a trait here: the chat backend and the
//! tools. Implementations live in their own crates, which keeps the loop
//! testable against scripted backends and stub tools.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role, Transcript};
pub use provider::{ChatBackend, ChatReply, ChatRequest, Health, ToolDefinition, Usage};
pub use tool::{Tool, ToolFailure, ToolOutcome, ToolRegistry};
