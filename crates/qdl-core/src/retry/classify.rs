//! Classify transfer failures into retry policy categories.

use serde::{Deserialize, Serialize};

use crate::retry::error::TransferError;

/// High-level classification of a failure, driving the retry decision
/// and the human-readable error text shown to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Network-level failure (refused, reset, DNS, proxy unreachable).
    Connection,
    /// Connect or read timed out.
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Redirect chain exceeded the limit. Terminal.
    TooManyRedirects,
    /// TLS failure or redirect downgraded security. Terminal.
    InsecureRedirect,
    /// 401/407: credentials needed. Surfaced, never retried silently.
    AuthRequired,
    /// 408: the one "resend" class that retries exactly once.
    ResendOnce,
    /// Any other 4xx (403, 404, 405, 409, 410, ...). Terminal.
    Client(u16),
    /// Retryable 5xx.
    Server(u16),
    /// Local filesystem failure (permissions, disk full). Terminal,
    /// surfaced as a file error.
    LocalIo,
    /// Malformed torrent or stream metadata. Terminal.
    BadMetadata,
    /// No forward progress for the stall interval; treated as transient.
    Stalled,
    /// User-requested stop. Not an error.
    Aborted,
    /// Anything else; not retried.
    Other,
}

impl ErrorCategory {
    /// True when exhausting (or lacking) retries should surface as a
    /// local file error rather than a server error.
    pub fn is_file_error(self) -> bool {
        self == ErrorCategory::LocalIo
    }

    /// Human-readable description for the event/UI surface.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorCategory::Connection => "could not reach the server",
            ErrorCategory::Timeout => "the connection timed out",
            ErrorCategory::Throttled => "the server asked to slow down",
            ErrorCategory::TooManyRedirects => "too many redirects",
            ErrorCategory::InsecureRedirect => "redirected to an insecure location",
            ErrorCategory::AuthRequired => "authentication required",
            ErrorCategory::ResendOnce => "the server timed out waiting for the request",
            ErrorCategory::Client(_) => "the server rejected the request",
            ErrorCategory::Server(_) => "the server failed to process the request",
            ErrorCategory::LocalIo => "could not write the destination file",
            ErrorCategory::BadMetadata => "the download metadata is malformed",
            ErrorCategory::Stalled => "the transfer stalled",
            ErrorCategory::Aborted => "stopped by user",
            ErrorCategory::Other => "the download failed",
        }
    }
}

/// Classify an HTTP status code.
pub fn classify_http_status(code: u32) -> ErrorCategory {
    match code {
        401 | 407 => ErrorCategory::AuthRequired,
        408 => ErrorCategory::ResendOnce,
        429 | 503 => ErrorCategory::Throttled,
        400..=499 => ErrorCategory::Client(code as u16),
        500..=599 => ErrorCategory::Server(code as u16),
        _ => ErrorCategory::Other,
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> ErrorCategory {
    if e.is_operation_timedout() {
        return ErrorCategory::Timeout;
    }
    if e.is_too_many_redirects() {
        return ErrorCategory::TooManyRedirects;
    }
    if e.is_ssl_connect_error() || e.is_ssl_certproblem() || e.is_peer_failed_verification() {
        return ErrorCategory::InsecureRedirect;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorCategory::Connection;
    }
    ErrorCategory::Other
}

/// Classify a raw transfer failure into a category.
pub fn classify(e: &TransferError) -> ErrorCategory {
    match e {
        TransferError::Curl(ce) => classify_curl_error(ce),
        TransferError::Http(code) => classify_http_status(*code),
        TransferError::Storage(_) => ErrorCategory::LocalIo,
        TransferError::Stalled => ErrorCategory::Stalled,
        TransferError::Aborted => ErrorCategory::Aborted,
        TransferError::BadMetadata(_) => ErrorCategory::BadMetadata,
    }
}
