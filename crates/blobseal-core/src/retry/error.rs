//! Error type returned by the retry executor

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Why a retried call gave up
///
/// Both variants carry the last attempt's error; backends unwrap it with
/// [`RetryError::into_source`] so callers see their own error type.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The policy ran out of attempts on retryable errors
    Exhausted {
        attempts: u32,
        source: E,
        elapsed: Duration,
    },

    /// The error was not transient
    NonRetryable { attempt: u32, source: E },
}

impl<E> RetryError<E> {
    pub fn exhausted(attempts: u32, source: E, elapsed: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            elapsed,
        }
    }

    pub fn non_retryable(attempt: u32, source: E) -> Self {
        RetryError::NonRetryable { attempt, source }
    }

    /// Attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::NonRetryable { attempt, .. } => *attempt,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                source
            }
        }
    }

    pub fn into_source(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                source
            }
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                elapsed,
            } => write!(
                f,
                "gave up after {} attempts ({:.1}s): {}",
                attempts,
                elapsed.as_secs_f64(),
                source
            ),
            RetryError::NonRetryable { attempt, source } => {
                write!(f, "attempt {} failed permanently: {}", attempt, source)
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.last_error())
    }
}
