//! Batch URL generation from numeric range patterns.
//!
//! `https://host/file[01-10].zip` expands into ten URLs with the
//! counter zero-padded to the pattern's width. One bracket pair per
//! pattern; expansion is bounded to keep a typo from flooding the queue.

use anyhow::{bail, Result};

/// Upper bound on generated URLs per pattern.
const MAX_BATCH: u64 = 10_000;

/// Expands a `[start-end]` numeric range pattern into concrete URLs.
///
/// A pattern without brackets expands to itself. Zero padding follows
/// the width of `start` (e.g. `[001-100]` pads to three digits).
pub fn expand_pattern(pattern: &str) -> Result<Vec<String>> {
    let Some(open) = pattern.find('[') else {
        return Ok(vec![pattern.to_string()]);
    };
    let Some(close) = pattern[open..].find(']').map(|i| open + i) else {
        bail!("unclosed '[' in batch pattern");
    };
    if pattern[close..].contains('[') {
        bail!("only one [start-end] range is supported per pattern");
    }

    let inner = &pattern[open + 1..close];
    let Some((lo, hi)) = inner.split_once('-') else {
        bail!("batch range must be [start-end], got [{}]", inner);
    };
    let width = lo.len();
    let start: u64 = lo.trim().parse().map_err(|_| anyhow::anyhow!("bad range start: {:?}", lo))?;
    let end: u64 = hi.trim().parse().map_err(|_| anyhow::anyhow!("bad range end: {:?}", hi))?;
    if end < start {
        bail!("batch range end {} is below start {}", end, start);
    }
    let count = end - start + 1;
    if count > MAX_BATCH {
        bail!("batch range generates {} URLs (limit {})", count, MAX_BATCH);
    }

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut out = Vec::with_capacity(count as usize);
    for n in start..=end {
        out.push(format!("{}{:0width$}{}", prefix, n, suffix, width = width));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_url_passes_through() {
        let urls = expand_pattern("https://example.com/file.zip").unwrap();
        assert_eq!(urls, vec!["https://example.com/file.zip"]);
    }

    #[test]
    fn expands_zero_padded_range() {
        let urls = expand_pattern("https://example.com/img[01-03].jpg").unwrap();
        assert_eq!(
            urls,
            vec![
                "https://example.com/img01.jpg",
                "https://example.com/img02.jpg",
                "https://example.com/img03.jpg",
            ]
        );
    }

    #[test]
    fn padding_follows_start_width() {
        let urls = expand_pattern("https://e.com/p[008-010].bin").unwrap();
        assert_eq!(urls, vec![
            "https://e.com/p008.bin",
            "https://e.com/p009.bin",
            "https://e.com/p010.bin",
        ]);
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!(expand_pattern("https://e.com/file[1-").is_err());
        assert!(expand_pattern("https://e.com/file[abc].zip").is_err());
        assert!(expand_pattern("https://e.com/file[9-1].zip").is_err());
        assert!(expand_pattern("https://e.com/a[1-2]b[3-4]").is_err());
    }

    #[test]
    fn rejects_oversized_ranges() {
        assert!(expand_pattern("https://e.com/f[0-100000].bin").is_err());
    }
}
