//! Backoff policy: which categories retry, and after how long.

use std::time::Duration;

use crate::retry::classify::ErrorCategory;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps, shared by segment workers and
/// the scheduler's task-level re-admission.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Compute the retry decision for a given attempt and category.
    ///
    /// `attempt` is 1-based (1 = first attempt). Terminal categories
    /// never retry; `ResendOnce` retries exactly once; transient
    /// categories back off exponentially up to `max_attempts`.
    pub fn decide(&self, attempt: u32, category: ErrorCategory) -> RetryDecision {
        match category {
            ErrorCategory::Aborted
            | ErrorCategory::LocalIo
            | ErrorCategory::BadMetadata
            | ErrorCategory::TooManyRedirects
            | ErrorCategory::InsecureRedirect
            | ErrorCategory::AuthRequired
            | ErrorCategory::Client(_)
            | ErrorCategory::Other => RetryDecision::NoRetry,
            ErrorCategory::ResendOnce => {
                if attempt <= 1 {
                    RetryDecision::RetryAfter(self.backoff(attempt))
                } else {
                    RetryDecision::NoRetry
                }
            }
            ErrorCategory::Connection
            | ErrorCategory::Timeout
            | ErrorCategory::Throttled
            | ErrorCategory::Stalled
            | ErrorCategory::Server(_) => {
                if attempt >= self.max_attempts {
                    RetryDecision::NoRetry
                } else {
                    RetryDecision::RetryAfter(self.backoff(attempt))
                }
            }
        }
    }

    /// Backoff delay for a 1-based attempt: base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        let raw = self.base_delay.saturating_mul(exp);
        raw.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_never_retry() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorCategory::Client(404)), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorCategory::Client(410)), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorCategory::LocalIo), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorCategory::BadMetadata), RetryDecision::NoRetry);
        assert_eq!(
            p.decide(1, ErrorCategory::TooManyRedirects),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn resend_class_retries_exactly_once() {
        let p = RetryPolicy::default();
        assert!(matches!(
            p.decide(1, ErrorCategory::ResendOnce),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(2, ErrorCategory::ResendOnce), RetryDecision::NoRetry);
    }

    #[test]
    fn auth_required_surfaces_without_retry() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorCategory::AuthRequired), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let mut p = RetryPolicy::default();
        p.max_attempts = 20;
        let d1 = p.backoff(1);
        let d2 = p.backoff(2);
        let d3 = p.backoff(3);
        assert!(d2 >= d1);
        assert!(d3 >= d2);
        assert!(p.backoff(15) <= p.max_delay);
    }

    #[test]
    fn transient_respects_max_attempts() {
        let mut p = RetryPolicy::default();
        p.max_attempts = 3;
        assert!(matches!(
            p.decide(1, ErrorCategory::Throttled),
            RetryDecision::RetryAfter(_)
        ));
        assert!(matches!(
            p.decide(2, ErrorCategory::Server(503)),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(3, ErrorCategory::Throttled), RetryDecision::NoRetry);
    }

    #[test]
    fn bound_of_five_allows_fourth_attempt() {
        // A 503 failing three times with budget 5 still leaves room for
        // a fourth attempt to succeed.
        let mut p = RetryPolicy::default();
        p.max_attempts = 5;
        for attempt in 1..=3 {
            assert!(matches!(
                p.decide(attempt, ErrorCategory::Throttled),
                RetryDecision::RetryAfter(_)
            ));
        }
    }
}
