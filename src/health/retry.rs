// src/health/retry.rs
use std::fmt;
use std::future::Future;

use tracing::debug;

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Immediate retries within a single probe invocation: one initial attempt
/// plus `max_retries` more, no backoff between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `f` until it succeeds, the budget is spent, or `should_retry`
    /// declines. The last error is returned.
    pub async fn execute<F, Fut, T, E>(
        &self,
        target: &str,
        mut f: F,
        should_retry: impl Fn(&E) -> RetryDecision,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if should_retry(&error) == RetryDecision::NoRetry {
                        debug!(target_addr = %target, %error, "probe error is not retryable");
                        return Err(error);
                    }
                    if attempt >= self.max_attempts() {
                        return Err(error);
                    }
                    debug!(
                        target_addr = %target,
                        attempt,
                        max = self.max_attempts(),
                        %error,
                        "probe attempt failed, retrying"
                    );
                }
            }
        }
    }
}
