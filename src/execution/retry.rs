//! Bounded exponential backoff for order calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::app::RetryConfig;
use crate::error::{Error, ExecutionError, Result};

/// Retries transient failures with exponential backoff.
///
/// Only connection-level failures are retried. A venue refusal is returned
/// immediately: resubmitting would not change the answer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `guard` is consulted before every attempt; returning an error aborts
    /// the call without another attempt.
    ///
    /// # Errors
    ///
    /// The guard's error, the first non-transient error, or
    /// `RetriesExhausted` carrying the last transient error.
    pub async fn run<T, F, Fut, G>(&self, mut op: F, mut guard: G) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnMut() -> Option<ExecutionError>,
    {
        let mut attempt = 0;
        loop {
            if let Some(err) = guard() {
                return Err(err.into());
            }
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "Transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) if is_transient(&err) => {
                    return Err(ExecutionError::RetriesExhausted {
                        attempts: attempt,
                        last_error: err.to_string(),
                    }
                    .into())
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Failures worth retrying.
#[must_use]
pub fn is_transient(err: &Error) -> bool {
    matches!(
        err,
        Error::Connection(_)
            | Error::Http(_)
            | Error::Io(_)
            | Error::WebSocket(_)
            | Error::Execution(ExecutionError::SubmissionFailed(_))
    )
}
