//! Bounded-retry combinator.
//!
//! One retry path for every fallible external call (extraction, store
//! writes) instead of a hand-rolled loop at each call site. Both arms
//! report how many attempts were made so the per-unit outcome can record
//! retries spent; exhaustion returns the last error and the caller records
//! a terminal per-unit failure without aborting the batch.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Always at least 1.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_retries + 1,
            delay,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Returns `(value, attempts)` on success, or `(last_error, attempts)`
/// once the policy is exhausted.
pub async fn attempt<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok((value, attempts)),
            Err(err) if attempts < max => {
                tracing::warn!(
                    op = label,
                    attempt = attempts,
                    max_attempts = max,
                    error = %err,
                    "retrying after failure"
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(err) => return Err((err, attempts)),
        }
    }
}
