//! Raw transfer failure as reported by a worker.

use std::fmt;

/// Error returned by a single transfer attempt (probe or segment GET).
/// Kept as a structured enum so we can classify and decide retries
/// before converting to anyhow.
#[derive(Debug)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, TLS, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Local filesystem failure while writing the destination.
    Storage(std::io::Error),
    /// No forward progress for the configured stall interval.
    Stalled,
    /// Transfer stopped by a user pause/cancel. Not an error condition.
    Aborted,
    /// Malformed torrent or stream metadata.
    BadMetadata(String),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::Storage(e) => write!(f, "storage: {}", e),
            TransferError::Stalled => write!(f, "transfer stalled"),
            TransferError::Aborted => write!(f, "transfer aborted"),
            TransferError::BadMetadata(msg) => write!(f, "bad metadata: {}", msg),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            _ => None,
        }
    }
}
