//! Server capability probing.
//!
//! A HEAD request (libcurl) learns `Content-Length`, whether the server
//! advertises `Accept-Ranges: bytes`, validators for safe resume, and
//! the Content-Disposition filename hint. Servers that block HEAD get a
//! one-byte ranged GET probe instead; a 206 answer proves range support
//! and carries the total size in `Content-Range`.

use std::collections::HashMap;
use std::str;
use std::time::Duration;

use crate::retry::TransferError;

/// Parsed metadata from the probe.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Total size in bytes, if the server told us.
    pub content_length: Option<u64>,
    /// True if ranged requests are supported.
    pub accept_ranges: bool,
    /// `ETag` value if present (resume validation).
    pub etag: Option<String>,
    /// `Last-Modified` value if present (resume validation).
    pub last_modified: Option<String>,
    /// `Content-Disposition` value if present (filename hint).
    pub content_disposition: Option<String>,
}

/// Probes `url` and returns parsed metadata.
///
/// Follows redirects; `custom_headers` carries referrer/cookies from a
/// resolver. Blocking; call from `spawn_blocking` in async code. The
/// error is structured so callers can classify it (a 404 here is as
/// terminal as one during transfer).
pub fn probe(url: &str, custom_headers: &HashMap<String, String>) -> Result<ProbeResult, TransferError> {
    match probe_head(url, custom_headers) {
        Ok(r) => Ok(r),
        // Some servers reject HEAD outright; retry as a 1-byte range GET.
        Err(TransferError::Http(405)) | Err(TransferError::Http(501)) => {
            probe_range_get(url, custom_headers)
        }
        Err(e) => Err(e),
    }
}

fn probe_head(
    url: &str,
    custom_headers: &HashMap<String, String>,
) -> Result<ProbeResult, TransferError> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(TransferError::Curl)?;
    easy.nobody(true).map_err(TransferError::Curl)?; // HEAD request
    configure(&mut easy, custom_headers)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    headers.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(TransferError::Curl)?;
        transfer.perform().map_err(TransferError::Curl)?;
    }

    let code = easy.response_code().map_err(TransferError::Curl)? as u32;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    Ok(parse_headers(&headers))
}

/// GET with `Range: bytes=0-0`: a 206 proves range support; the total
/// size comes from `Content-Range: bytes 0-0/total`.
fn probe_range_get(
    url: &str,
    custom_headers: &HashMap<String, String>,
) -> Result<ProbeResult, TransferError> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(TransferError::Curl)?;
    easy.range("0-0").map_err(TransferError::Curl)?;
    configure(&mut easy, custom_headers)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    headers.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(TransferError::Curl)?;
        transfer
            .write_function(|data| Ok(data.len()))
            .map_err(TransferError::Curl)?;
        transfer.perform().map_err(TransferError::Curl)?;
    }

    let code = easy.response_code().map_err(TransferError::Curl)? as u32;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    let mut result = parse_headers(&headers);
    if code == 206 {
        result.accept_ranges = true;
        if let Some(total) = headers.iter().find_map(|l| parse_content_range_total(l)) {
            result.content_length = Some(total);
        }
    }
    Ok(result)
}

fn configure(
    easy: &mut curl::easy::Easy,
    custom_headers: &HashMap<String, String>,
) -> Result<(), TransferError> {
    easy.follow_location(true).map_err(TransferError::Curl)?;
    easy.connect_timeout(Duration::from_secs(15))
        .map_err(TransferError::Curl)?;
    easy.timeout(Duration::from_secs(30))
        .map_err(TransferError::Curl)?;

    let mut list = curl::easy::List::new();
    for (k, v) in custom_headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))
            .map_err(TransferError::Curl)?;
    }
    if !custom_headers.is_empty() {
        easy.http_headers(list).map_err(TransferError::Curl)?;
    }
    Ok(())
}

/// Parse collected header lines into a ProbeResult.
fn parse_headers(lines: &[String]) -> ProbeResult {
    let mut content_length = None;
    let mut accept_ranges = false;
    let mut etag = None;
    let mut last_modified = None;
    let mut content_disposition = None;

    for line in lines {
        let line = line.trim();
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            if let Ok(n) = value.parse::<u64>() {
                content_length = Some(n);
            }
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("etag") {
            etag = Some(value.trim_matches('"').to_string());
        } else if name.eq_ignore_ascii_case("last-modified") {
            last_modified = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-disposition") {
            content_disposition = Some(value.to_string());
        }
    }

    ProbeResult {
        content_length,
        accept_ranges,
        etag,
        last_modified,
        content_disposition,
    }
}

/// Total from `Content-Range: bytes 0-0/12345`.
fn parse_content_range_total(line: &str) -> Option<u64> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-range") {
        return None;
    }
    let value = value.trim();
    let rest = value.strip_prefix("bytes")?.trim();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_content_length_and_ranges() {
        let lines = [
            "HTTP/1.1 200 OK".to_string(),
            "Content-Length: 12345".to_string(),
            "Accept-Ranges: bytes".to_string(),
        ];
        let r = parse_headers(&lines);
        assert_eq!(r.content_length, Some(12345));
        assert!(r.accept_ranges);
        assert!(r.etag.is_none());
    }

    #[test]
    fn parse_validators() {
        let lines = [
            "ETag: \"abc-123\"".to_string(),
            "Last-Modified: Wed, 21 Oct 2015 07:28:00 GMT".to_string(),
        ];
        let r = parse_headers(&lines);
        assert_eq!(r.etag.as_deref(), Some("abc-123"));
        assert_eq!(r.last_modified.as_deref(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
    }

    #[test]
    fn parse_no_range_support() {
        let lines = ["Accept-Ranges: none".to_string()];
        assert!(!parse_headers(&lines).accept_ranges);
    }

    #[test]
    fn parse_content_disposition_hint() {
        let lines = ["Content-Disposition: attachment; filename=\"r.pdf\"".to_string()];
        let r = parse_headers(&lines);
        assert!(r.content_disposition.as_deref().unwrap().contains("r.pdf"));
    }

    #[test]
    fn content_range_total() {
        assert_eq!(
            parse_content_range_total("Content-Range: bytes 0-0/98765"),
            Some(98765)
        );
        assert_eq!(parse_content_range_total("Content-Range: bytes */5"), Some(5));
        assert_eq!(parse_content_range_total("Content-Length: 5"), None);
    }
}
