//! Retry loop

use super::error::RetryError;
use super::{backoff_delay, Transient};
use crate::types::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, warn};

/// Run `op` under `policy`, retrying only transient errors
///
/// `operation` names the call in retry diagnostics. A policy with
/// `max_attempts == 0` still makes one attempt.
pub async fn retry_transient<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + Transient,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient() {
            debug!(operation, attempt, error = %err, "not retrying permanent error");
            return Err(RetryError::non_retryable(attempt, err));
        }
        if attempt >= max_attempts {
            warn!(operation, attempts = attempt, error = %err, "giving up");
            return Err(RetryError::exhausted(attempt, err, start.elapsed()));
        }

        let delay = backoff_delay(policy, attempt, true);
        warn!(
            operation,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "transient failure, retrying"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}
