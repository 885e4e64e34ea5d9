//! # Opt-in Retry
//!
//! Re-runs a fallible async operation with exponential delays. Nothing in
//! the gateway retries on its own; callers wrap the calls they consider
//! safe to repeat.
//!
//! ## Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  retry_request(3, op)                                                   │
//! │                                                                         │
//! │  attempt 1 ── fail ── sleep 1s ── attempt 2 ── fail ── sleep 2s ──     │
//! │  attempt 3 ── fail ──► Err(last error)                                 │
//! │                                                                         │
//! │  Delay before attempt n+1 is 2^(n-1) seconds. No jitter. No sleep      │
//! │  after the final attempt.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::error::GatewayError;

/// Delay before the second attempt.
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on a single delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Creates the doubling, jitter-free delay schedule.
fn create_backoff() -> ExponentialBackoff {
    let mut backoff = ExponentialBackoff {
        initial_interval: INITIAL_RETRY_DELAY,
        max_interval: MAX_RETRY_DELAY,
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_time: None,
        ..Default::default()
    };
    backoff.reset();
    backoff
}

/// Calls `operation` up to `max_attempts` times, returning the first
/// success or the last error. A `max_attempts` of 0 still makes one call.
pub async fn retry_request<T, E, F, Fut>(max_attempts: u32, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_if(max_attempts, |_| true, operation).await
}

/// Like [`retry_request`], but gives up immediately on an error for which
/// `should_retry` returns false.
pub async fn retry_if<T, E, F, Fut, P>(
    max_attempts: u32,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut backoff = create_backoff();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Retried operation succeeded");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= max_attempts || !should_retry(&err) {
                    warn!(attempt, max_attempts, error = %err, "Giving up on operation");
                    return Err(err);
                }

                let delay = backoff.next_backoff().unwrap_or(MAX_RETRY_DELAY);
                debug!(attempt, ?delay, error = %err, "Operation failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retries only failures a repeat could fix (see [`GatewayError::is_retryable`]).
pub async fn retry_transient<T, F, Fut>(max_attempts: u32, operation: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    retry_if(max_attempts, GatewayError::is_retryable, operation).await
}

// =============================================================================
// Unit Tests
// =============================================================================
