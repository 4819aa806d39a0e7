//! Fixed-delay retry for transient provider failures.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{SummaryError, SummaryResult};

/// How many times to call a provider and how long to wait between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations, first try included. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, or exhausts `policy.max_attempts`.
///
/// Only network errors and 5xx responses are retried. The returned error records the number of
/// attempts made. Cancellation is checked before each attempt and interrupts the delay.
pub async fn with_retry<F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> SummaryResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SummaryResult>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(SummaryError::cancelled().with_attempts(attempt));
        }
        attempt += 1;

        let error = match operation().await {
            Ok(summary) => return Ok(summary),
            Err(error) => error.with_attempts(attempt),
        };

        if !error.kind.is_retryable() || attempt >= max_attempts {
            if error.kind.is_retryable() {
                tracing::warn!(
                    provider = error.provider.as_deref().unwrap_or_default(),
                    attempt,
                    kind = %error.kind,
                    "Giving up after final attempt"
                );
            }
            return Err(error);
        }

        tracing::warn!(
            provider = error.provider.as_deref().unwrap_or_default(),
            attempt,
            max_attempts,
            kind = %error.kind,
            delay_ms = policy.delay.as_millis() as u64,
            "Transient provider failure; retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                let mut cancelled = SummaryError::cancelled().with_attempts(attempt);
                cancelled.provider = error.provider;
                return Err(cancelled);
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}
