use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a feed source or cover image.
///
/// Only absolute `http`/`https` URLs with a host are accepted. The feed URL
/// comes from operator configuration, so loopback hosts are allowed (local
/// mirrors and test servers rely on that).
///
/// # Examples
///
/// ```
/// use feedmirror::util::validate_url;
///
/// let url = validate_url("https://example.substack.com/feed").unwrap();
/// assert_eq!(url.host_str(), Some("example.substack.com"));
///
/// assert!(validate_url("javascript:alert(1)").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;
    check_scheme(url)
}

/// Resolves a possibly-relative URL against `base`, then validates it.
///
/// Used for `<img src>` values sniffed from post bodies, which are sometimes
/// site-relative. Without a usable base only absolute URLs pass.
pub fn resolve_url(candidate: &str, base: Option<&str>) -> Result<Url, UrlValidationError> {
    let candidate = candidate.trim();
    let url = match Url::parse(candidate) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = base
                .and_then(|b| Url::parse(b.trim()).ok())
                .ok_or(url::ParseError::RelativeUrlWithoutBase)?;
            base.join(candidate)?
        }
        Err(e) => return Err(e.into()),
    };
    check_scheme(url)
}

fn check_scheme(url: Url) -> Result<Url, UrlValidationError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.substack.com/feed").is_ok());
        assert!(validate_url("http://news.example.org").is_ok());
        assert!(validate_url("  https://example.com/feed  ").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
        assert!(validate_url("data:image/png;base64,AAAA").is_err());
    }

    #[test]
    fn test_unparseable_rejected() {
        assert!(matches!(
            validate_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_localhost_allowed_for_configured_feeds() {
        assert!(validate_url("http://127.0.0.1:8080/feed").is_ok());
        assert!(validate_url("http://localhost/feed").is_ok());
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let url = resolve_url("/img/cover.png", Some("https://s.example/p/post")).unwrap();
        assert_eq!(url.as_str(), "https://s.example/img/cover.png");
    }

    #[test]
    fn test_resolve_relative_without_base_fails() {
        assert!(resolve_url("/img/cover.png", None).is_err());
        assert!(resolve_url("/img/cover.png", Some("")).is_err());
    }

    #[test]
    fn test_resolve_absolute_ignores_base() {
        let url = resolve_url("https://cdn.example/x.png", Some("https://s.example/p")).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/x.png");
    }

    #[test]
    fn test_resolve_rejects_unsafe_scheme() {
        assert!(resolve_url("javascript:alert(1)", Some("https://s.example/")).is_err());
    }
}
