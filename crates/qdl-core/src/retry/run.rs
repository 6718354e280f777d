//! Retry loop for blocking worker code.

use crate::retry::classify::{classify, ErrorCategory};
use crate::retry::error::TransferError;
use crate::retry::policy::{RetryDecision, RetryPolicy};

/// Runs a closure until it succeeds or the retry policy says to stop.
/// On a retryable failure, sleeps for the backoff duration then tries
/// again. Transient failures are logged and retried silently; the last
/// error is returned when the budget runs out. An aborted transfer is
/// returned immediately.
pub fn run_with_retry<F>(policy: &RetryPolicy, mut f: F) -> Result<(), TransferError>
where
    F: FnMut() -> Result<(), TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match f() {
            Ok(()) => return Ok(()),
            Err(e) => {
                let category = classify(&e);
                if category == ErrorCategory::Aborted {
                    return Err(e);
                }
                match policy.decide(attempt, category) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, error = %e, delay_ms = d.as_millis() as u64, "retrying transfer");
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}
