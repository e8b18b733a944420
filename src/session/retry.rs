//! Bounded retry loop shared by the role lookup and the initial probe.
//!
//! Each attempt races its own deadline and the cleanup signal. Only
//! `AuthError::retryable` failures are retried; the last error is returned
//! once attempts run out.

use std::future::Future;

use tracing::warn;

use super::cleanup::Cleanup;
use crate::config::RetryPolicy;
use crate::error::AuthError;

#[derive(Debug)]
pub enum RetryError {
    /// Cleanup was signalled while waiting.
    Cancelled,
    /// Non-retryable failure or attempts exhausted.
    Failed(AuthError),
}

pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    cleanup: &Cleanup,
    operation: &'static str,
    mut call: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AuthError>>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        let outcome = tokio::select! {
            biased;
            () = cleanup.signalled() => return Err(RetryError::Cancelled),
            outcome = tokio::time::timeout(policy.attempt_timeout, call()) => outcome,
        };

        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => AuthError::Timeout(policy.attempt_timeout),
        };

        if !err.retryable() {
            warn!(operation, attempt, error = %err, code = err.error_code(), "non-retryable failure");
            return Err(RetryError::Failed(err));
        }
        if attempt == attempts {
            warn!(operation, attempts, error = %err, "retries exhausted");
            return Err(RetryError::Failed(err));
        }

        warn!(operation, attempt, total = attempts, error = %err, "attempt failed; retrying");
        tokio::select! {
            biased;
            () = cleanup.signalled() => return Err(RetryError::Cancelled),
            () = tokio::time::sleep(policy.backoff) => {}
        }
    }
    // `attempts >= 1`, so the loop always returns.
    Err(RetryError::Failed(AuthError::Timeout(policy.attempt_timeout)))
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
