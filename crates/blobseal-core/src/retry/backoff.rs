//! Delay between attempts

use crate::types::{RetryPolicy, RetryStrategy};
use rand::Rng;
use std::time::Duration;

/// Delay after the 1-indexed `attempt` failed, capped at `max_delay_ms`
///
/// With `jitter`, up to a quarter of the capped delay is added at random so
/// concurrent stages do not retry in lockstep.
///
/// ```rust
/// use blobseal_core::retry::backoff_delay;
/// use blobseal_core::types::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(backoff_delay(&policy, 1, false).as_millis(), 500);
/// assert_eq!(backoff_delay(&policy, 2, false).as_millis(), 1000);
/// ```
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let step = attempt.saturating_sub(1);
    let initial = policy.initial_delay_ms;

    let delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => initial,
        RetryStrategy::LinearBackoff => initial.saturating_mul(u64::from(step) + 1),
        RetryStrategy::ExponentialBackoff => {
            (initial as f64 * policy.backoff_multiplier.powi(step as i32)) as u64
        }
    }
    .min(policy.max_delay_ms);

    if !jitter || delay_ms == 0 {
        return Duration::from_millis(delay_ms);
    }
    Duration::from_millis(delay_ms + rand::rng().random_range(0..=delay_ms / 4))
}
