//! Stream resolver collaborator interface.
//!
//! A stream task starts from a web-page URL; an external resolver (a
//! subprocess or library) turns it into one or more direct media URLs.
//! The core only consumes the resolver's output as a list of resolvable
//! resources and downloads them like direct tasks.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::retry::TransferError;

/// One resolved media resource: a direct URL plus whatever the resolver
/// learned about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    /// Filename hint from the resolver (title-derived), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Request headers the media host requires (cookies, referers).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Trait implemented by external stream resolvers.
///
/// A failed resolution is a metadata error: terminal unless the
/// classifier sees it as a transient transport failure.
pub trait StreamResolver: Send + Sync {
    fn resolve(&self, page_url: &str) -> Result<Vec<ResolvedMedia>, TransferError>;
}

/// Placeholder used when no resolver is wired in.
pub struct NoStreamResolver;

impl StreamResolver for NoStreamResolver {
    fn resolve(&self, _page_url: &str) -> Result<Vec<ResolvedMedia>, TransferError> {
        Err(TransferError::BadMetadata(
            "no stream resolver configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_media_json_roundtrip() {
        let mut headers = HashMap::new();
        headers.insert("Referer".to_string(), "https://example.com/watch".to_string());
        let media = ResolvedMedia {
            url: "https://cdn.example.com/v/1080.mp4".to_string(),
            filename: Some("episode-01.mp4".to_string()),
            headers,
        };
        let json = serde_json::to_string(&media).unwrap();
        let back: ResolvedMedia = serde_json::from_str(&json).unwrap();
        assert_eq!(back, media);
    }

    #[test]
    fn missing_resolver_is_metadata_error() {
        let r = NoStreamResolver;
        let err = r.resolve("https://example.com/watch").unwrap_err();
        assert!(matches!(err, TransferError::BadMetadata(_)));
    }
}
