//! Per-call retry with timeout and exponential backoff.
//!
//! Every backend call in the pipeline goes through [`run_with_retry`]. Each
//! attempt is bounded by `call_timeout`; an expired timeout counts as a
//! transient failure. Only transient failures are retried. The wait before
//! attempt `k` (k ≥ 2) is `initial_backoff * 2^(k-2)`: 1 s, 2 s, 4 s ...
//!
//! The sleep is a `tokio::time::sleep`, so a task waiting out its backoff
//! yields to every other task in the batch.

use crate::error::TranslationError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::warn;

/// Attempt limit, backoff base and per-call timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Treated as at least 1.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles for each later attempt.
    pub initial_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff slept before `attempt` (1-based). Zero for the first attempt.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.initial_backoff.saturating_mul(factor)
    }
}

/// Result of a retried call plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    pub result: Result<T, TranslationError>,
    pub attempts: u32,
}

/// Run `call` under `policy`.
///
/// `label` identifies the call in log lines ("image 3", "text chunk 1/4").
/// Never panics and never gives up early on a transient error; the last error
/// is returned once attempts run out.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut call: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TranslationError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let backoff = policy.backoff_before(attempt);
        if !backoff.is_zero() {
            warn!(
                "{}: retry {}/{} after {}ms",
                label,
                attempt - 1,
                max_attempts - 1,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        let err = match timeout(policy.call_timeout, call()).await {
            Ok(Ok(value)) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Ok(Err(e)) => e,
            Err(_) => TranslationError::Timeout {
                secs: policy.call_timeout.as_secs(),
            },
        };

        warn!("{}: attempt {} failed: {}", label, attempt, err);
        if !err.is_retryable() || attempt >= max_attempts {
            return RetryOutcome {
                result: Err(err),
                attempts: attempt,
            };
        }
    }
}
