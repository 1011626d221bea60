//! `file://` helpers used for failure diagnostics.

use std::path::PathBuf;

/// Scheme prefix of local-file URLs.
pub const FILE_PROTOCOL: &str = "file://";

/// Local path behind a `file://` URL, or `None` for any other scheme.
///
/// Falls back to stripping the prefix when the URL does not convert cleanly
/// (e.g. a non-local host), so diagnostics still have something to check.
pub fn local_file_path(url: &str) -> Option<PathBuf> {
    if !url.starts_with(FILE_PROTOCOL) {
        return None;
    }
    match url::Url::parse(url).ok().and_then(|u| u.to_file_path().ok()) {
        Some(path) => Some(path),
        None => Some(PathBuf::from(&url[FILE_PROTOCOL.len()..])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_file_urls() {
        assert_eq!(local_file_path("https://example.com/a.txt"), None);
        assert_eq!(local_file_path("ftp://example.com/a.txt"), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_url_to_path() {
        assert_eq!(
            local_file_path("file:///tmp/assets/a%20b.bundle"),
            Some(PathBuf::from("/tmp/assets/a b.bundle"))
        );
    }

    #[test]
    fn unconvertible_file_url_strips_prefix() {
        assert_eq!(
            local_file_path("file://remotehost/share/x"),
            Some(PathBuf::from("remotehost/share/x"))
        );
    }
}
