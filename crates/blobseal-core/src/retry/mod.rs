//! Retry of transient failures
//!
//! Calls to the secret store and object storage go through
//! [`retry_transient`]: errors that report themselves as [`Transient`]
//! (timeouts, throttling, 5xx) are retried with the configured backoff,
//! anything else (not found, permission denied, precondition failed)
//! surfaces on the first attempt.
//!
//! ```rust,no_run
//! use blobseal_core::retry::{retry_transient, RetryError, Transient};
//! use blobseal_core::types::RetryPolicy;
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "flaky")
//!     }
//! }
//!
//! impl Transient for Flaky {
//!     fn is_transient(&self) -> bool {
//!         true
//!     }
//! }
//!
//! async fn example() -> Result<u32, RetryError<Flaky>> {
//!     retry_transient(&RetryPolicy::default(), "fetch", || async { Ok(7) }).await
//! }
//! ```

mod backoff;
mod error;
mod executor;

pub use backoff::backoff_delay;
pub use error::RetryError;
pub use executor::retry_transient;

/// Errors that know whether another attempt could succeed
///
/// Timeouts, throttling, server errors and dropped connections are
/// transient; everything else fails the same way every time.
pub trait Transient {
    fn is_transient(&self) -> bool;
}
