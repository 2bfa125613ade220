//! Bounded retry with exponential backoff for concurrency conflicts.
//!
//! Only errors for which [`CustodiaError::is_retryable`] holds are retried.
//! Every other error is returned on first occurrence. The sleep is a plain
//! thread sleep: settlement runs on request threads, never on an async
//! executor.

use std::thread;
use std::time::Duration;

use custodia_types::{CustodiaError, Result, RetryPolicy};
use rand::Rng;
use tracing::warn;

/// Delay before retry number `attempt`, with up to 50% added jitter.
#[must_use]
pub fn jittered_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.backoff(attempt);
    let millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return base;
    }
    let jitter = rand::thread_rng().gen_range(0..=millis / 2);
    Duration::from_millis(millis.saturating_add(jitter).min(policy.backoff_max_ms.max(millis)))
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent.
///
/// When the budget is spent the last conflict is reported as
/// [`CustodiaError::ConcurrencyConflict`] carrying the total attempt count.
pub fn with_backoff<T>(
    policy: &RetryPolicy,
    resource: &str,
    mut operation: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 0u32;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                if attempt >= policy.max_retries {
                    warn!(resource, attempts = attempt + 1, "retry budget exhausted");
                    return Err(CustodiaError::ConcurrencyConflict {
                        resource: resource.to_string(),
                        attempts: attempt + 1,
                    });
                }
                let delay = jittered_delay(policy, attempt);
                warn!(
                    resource,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "concurrency conflict, backing off"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
