//! Destination filename derivation.
//!
//! Derives a safe local filename from the Content-Disposition header or
//! the URL path, sanitized for Linux filesystems, and produces
//! non-colliding variants for the Rename conflict decision.

use std::path::Path;

/// Default filename when neither URL path nor headers yield a name.
const DEFAULT_FILENAME: &str = "download.bin";

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Derives a safe filename for saving a download.
///
/// Prefers the filename from `content_disposition` (if parseable),
/// otherwise the last path segment of `url`, otherwise a default.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(content_disposition_filename)
        .filter(|s| !s.is_empty())
        .or_else(|| filename_from_url_path(url));

    let raw = match candidate {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };

    let sanitized = sanitize(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Last path segment of a URL, or None for root/unparseable URLs.
fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Extracts the filename from a Content-Disposition value. Handles the
/// quoted and token forms of `filename=`; `filename*=UTF-8''...` takes
/// precedence when present.
fn content_disposition_filename(value: &str) -> Option<String> {
    let mut plain: Option<String> = None;
    for param in value.split(';') {
        let param = param.trim();
        let Some((name, v)) = param.split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let v = v.trim();
        if name == "filename*" {
            let rest = v
                .strip_prefix("UTF-8''")
                .or_else(|| v.strip_prefix("utf-8''"))?;
            let decoded = percent_decode(rest);
            if !decoded.is_empty() {
                return Some(decoded);
            }
        } else if name == "filename" {
            let unquoted = v.trim_matches('"');
            if !unquoted.is_empty() {
                plain = Some(unquoted.to_string());
            }
        }
    }
    plain
}

fn percent_decode(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next().and_then(|c| (c as char).to_digit(16));
            let lo = bytes.next().and_then(|c| (c as char).to_digit(16));
            match (hi, lo) {
                (Some(h), Some(l)) => out.push((h * 16 + l) as u8),
                _ => out.push(b'%'),
            }
        } else {
            out.push(b);
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Replaces path separators, NUL, control chars, and whitespace with
/// `_`, collapses runs, trims dots and spaces, and caps the length.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let mapped = if c == '\0' || c == '/' || c == '\\' || c.is_control() || c == ' ' || c == '\t'
        {
            '_'
        } else {
            c
        };
        if mapped == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(mapped);
            prev_underscore = false;
        }
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Derives a filename that does not collide with any existing file in
/// `dir` nor with any name in `reserved`, by appending ` (n)` before the
/// extension: `file.zip`, `file (1).zip`, `file (2).zip`, ...
///
/// Used by the Rename conflict decision.
pub fn unique_filename(dir: &Path, candidate: &str, reserved: &[String]) -> String {
    let taken = |name: &str| -> bool {
        dir.join(name).exists() || reserved.iter().any(|r| r == name)
    };
    if !taken(candidate) {
        return candidate.to_string();
    }
    let (stem, ext) = split_extension(candidate);
    for n in 1u32.. {
        let attempt = if ext.is_empty() {
            format!("{} ({})", stem, n)
        } else {
            format!("{} ({}).{}", stem, n, ext)
        };
        if !taken(&attempt) {
            return attempt;
        }
    }
    unreachable!("counter exhausted")
}

/// Splits `file.tar.gz` into (`file.tar`, `gz`); names without a dot
/// (or with only a leading dot) have an empty extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}
