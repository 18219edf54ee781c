//! URL canonicalization so equal resources share one cache key.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve `input` against the serving `origin` and canonicalize it.
///
/// Relative paths (`/index.html`, `icons/a.png`) resolve against the
/// origin; absolute URLs are kept. Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Resolve against `origin`
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(origin: &url::Url, input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> url::Url {
        url::Url::parse("https://absensi.test").unwrap()
    }

    #[test]
    fn test_resolve_root_relative() {
        let url = resolve(&origin(), "/icons/icon-192x192.png").unwrap();
        assert_eq!(url.as_str(), "https://absensi.test/icons/icon-192x192.png");
    }

    #[test]
    fn test_resolve_root() {
        let url = resolve(&origin(), "/").unwrap();
        assert_eq!(url.as_str(), "https://absensi.test/");
    }

    #[test]
    fn test_resolve_absolute_kept() {
        let url = resolve(&origin(), "https://CDN.jsdelivr.net/npm/chart.js").unwrap();
        assert_eq!(url.as_str(), "https://cdn.jsdelivr.net/npm/chart.js");
    }

    #[test]
    fn test_resolve_remove_fragment_preserve_query() {
        let url = resolve(&origin(), "/admin.html?tab=rekap#top").unwrap();
        assert_eq!(url.query(), Some("tab=rekap"));
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_resolve_trim_whitespace() {
        let url = resolve(&origin(), "  /login.html  ").unwrap();
        assert_eq!(url.path(), "/login.html");
    }

    #[test]
    fn test_resolve_unsupported_scheme() {
        let result = resolve(&origin(), "file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&origin(), ""), Err(UrlError::Empty)));
        assert!(matches!(resolve(&origin(), "   "), Err(UrlError::Empty)));
    }
}
