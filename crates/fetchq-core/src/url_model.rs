//! Local filenames for fetched bodies.
//!
//! Names come from the last URL path segment, sanitized for Linux
//! filesystems. The same URL may be fetched several times, so callers pass
//! the names already taken and get a suffixed one back.

use std::collections::HashSet;

/// Fallback when the URL has no usable path segment.
const DEFAULT_FILENAME: &str = "download.bin";

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Last non-empty path segment of `url`, as it appears in the URL.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    match segment {
        "." | ".." => None,
        _ => Some(segment.to_string()),
    }
}

/// Replaces path separators, NUL, control characters and whitespace with a
/// single `_`, trims dots/underscores at both ends and caps the byte length.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let bad = c == '/' || c == '\\' || c.is_control() || c.is_whitespace();
        let c = if bad { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// Filename for the body fetched from `url`, unique among `taken`.
///
/// A clash gets `-1`, `-2`, ... inserted before the extension.
pub fn output_filename(url: &str, taken: &HashSet<String>) -> String {
    let base = filename_from_url_path(url)
        .map(|n| sanitize_filename(&n))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    if !taken.contains(&base) {
        return base;
    }
    let (stem, ext) = match base.rfind('.') {
        Some(dot) if dot > 0 => (&base[..dot], &base[dot..]),
        _ => (base.as_str(), ""),
    };
    (1..)
        .map(|n| format!("{stem}-{n}{ext}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}
