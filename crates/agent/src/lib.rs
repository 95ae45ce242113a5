//! The tool-calling agent loop at the heart of Toolloop.
//!
//! Each user message runs through rounds of:
//!
//! 1. **Probe** the backend; if it is unreachable, say so and stop
//! 2. **Send** system prompt + history + user message + tool catalog
//! 3. **If tool calls**: run them concurrently, append the results, next round
//! 4. **If text**: that is the answer
//!
//! The loop stops at the first plain answer or when the round index passes
//! the recursion limit. Backend calls are retried with linear backoff.

pub mod dispatcher;
pub mod loop_runner;
pub mod prompt;
pub mod retry;

pub use dispatcher::{DispatchOutcome, DispatchOutcomes, ToolDispatcher};
pub use loop_runner::{AgentLoop, RECURSION_LIMIT_MESSAGE};
pub use retry::{RetryError, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
