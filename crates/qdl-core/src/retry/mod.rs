//! Error classification and retry/backoff policy.
//!
//! Raw transport failures (curl errors, HTTP statuses, storage I/O) are
//! classified into categories before being attached to a task, so the
//! scheduler and workers share one consistent policy: transient errors
//! retry with exponential backoff, terminal ones surface immediately.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status, ErrorCategory};
pub use error::TransferError;
pub use policy::{RetryDecision, RetryPolicy};
pub use run::run_with_retry;
