//! Resilience wrapper
//!
//! Retries happen at the request-execution level: once a stream is open its
//! bytes belong to the caller, so only the connect-and-validate step is
//! repeated. Classification lives on [`Error::is_retryable`].

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{Error, Result};

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(4);

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay.max(base_delay);
        self
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the `failures`-th failed attempt (1-based).
    ///
    /// `base * 2^(failures-1)`, raised to the server's `Retry-After` hint, never
    /// below `previous`, capped at `max_delay`.
    pub fn backoff(&self, failures: u32, retry_after_ms: Option<u64>, previous: Duration) -> Duration {
        let factor = 1u32.checked_shl(failures.saturating_sub(1)).unwrap_or(u32::MAX);
        let exponential = self.base_delay.saturating_mul(factor);
        let hinted = retry_after_ms.map(Duration::from_millis).unwrap_or(Duration::ZERO);
        exponential.max(hinted).max(previous).min(self.max_delay)
    }
}

/// Successful outcome together with the number of attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `operation(attempt)` until it succeeds, fails permanently or attempts run out.
///
/// `attempt` is 1-based. The last error is returned unchanged. Cancellation wins
/// over both an in-flight attempt and a pending backoff sleep.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<Retried<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut previous = Duration::ZERO;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = operation(attempt) => r,
        };

        let err = match outcome {
            Ok(value) => return Ok(Retried { value, attempts: attempt }),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= max_attempts {
            return Err(err);
        }

        let delay = policy.backoff(attempt, err.retry_after_ms(), previous);
        previous = delay;
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            http_status = err.status_code(),
            error = %err,
            "provider attempt failed; retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
