//! Retry with linear backoff for backend calls.
//!
//! Every transport failure is retried: a local model server that is loading
//! a model answers 5xx or drops connections for a few seconds, and that is
//! exactly the window the backoff covers. The delay before attempt `i`
//! (0-indexed) is `base_delay * i`, so the first attempt goes out at once.

use std::future::Future;
use std::time::Duration;
use toolloop_core::error::ProviderError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included (default 3).
    pub max_retries: u32,
    /// Delay unit multiplied by the attempt index (default 1s).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    /// Delay before the given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl From<&toolloop_config::AgentSettings> for RetryPolicy {
    fn from(settings: &toolloop_config::AgentSettings) -> Self {
        Self::new(settings.max_retries, settings.retry_base_delay())
    }
}

/// Why [`with_retry`] gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("cancelled")]
    Cancelled,

    #[error("{last} (after {attempts} attempts)")]
    Exhausted { attempts: u32, last: ProviderError },
}

/// Run `operation` until it succeeds, attempts run out, or `cancel` fires.
///
/// Both the operation and the sleeps between attempts race the token.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let attempts = policy.max_retries.max(1);
    let mut last = None;

    for attempt in 0..attempts {
        let delay = policy.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            r = operation() => r,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 < attempts {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = policy.delay_for_attempt(attempt + 1).as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                }
                last = Some(err);
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts,
        last: last.unwrap_or_else(|| ProviderError::Network("no attempt was made".into())),
    })
}
