//! URL normalization.
//!
//! Every URL that reaches the store goes through [`normalize`] exactly once,
//! at write time. Lookups by URL must use the same [`NormalizedUrl`] form, so
//! two textually different inputs that parse to the same WHATWG serialization
//! (e.g. `http://EX.com/a` and `http://ex.com/a`) share one mapping.

use std::fmt;

use serde::{Serialize, Serializer};
use url::Url;

use crate::error::{Result, ShortlinkError};

/// Minimum number of characters that must follow the scheme separator.
const MIN_TAIL_LEN: usize = 3;

/// A URL in its canonical serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl {
    parsed: Url,
}

impl NormalizedUrl {
    /// The canonical serialization, as stored and compared.
    pub fn as_str(&self) -> &str {
        self.parsed.as_str()
    }

    /// Host component (lower-cased by the parser for domain names).
    pub fn host(&self) -> Option<&str> {
        self.parsed.host_str()
    }

    /// Whether this URL points at `host`, ignoring ASCII case.
    pub fn has_host(&self, host: &str) -> bool {
        self.host()
            .map(|h| h.eq_ignore_ascii_case(host))
            .unwrap_or(false)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NormalizedUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Canonicalize a raw URL string.
///
/// The raw input must start with `http://` or `https://` and carry at least
/// three more characters; it must then parse and have a host.
pub fn normalize(raw: &str) -> Result<NormalizedUrl> {
    let tail = raw
        .strip_prefix("http://")
        .or_else(|| raw.strip_prefix("https://"))
        .ok_or_else(|| ShortlinkError::invalid_url(raw, "scheme must be http or https"))?;

    // Same shape as `^https?://.{3,}`: line breaks do not count.
    let leading = tail.chars().take_while(|c| *c != '\n' && *c != '\r').count();
    if leading < MIN_TAIL_LEN {
        return Err(ShortlinkError::invalid_url(raw, "address is too short"));
    }

    let parsed = Url::parse(raw).map_err(|e| ShortlinkError::invalid_url(raw, e.to_string()))?;
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(ShortlinkError::invalid_url(raw, "missing host"));
    }

    Ok(NormalizedUrl { parsed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host_and_adds_root_path() {
        let a = normalize("http://EX.com").unwrap();
        let b = normalize("http://ex.com/").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "http://ex.com/");
    }

    #[test]
    fn textual_variants_share_a_form() {
        let a = normalize("http://EX.com/a").unwrap();
        let b = normalize("http://ex.com/a").unwrap();
        assert_eq!(a.as_str(), b.as_str());

        let c = normalize("https://example.com:443/x/../y").unwrap();
        assert_eq!(c.as_str(), "https://example.com/y");
    }

    #[test]
    fn keeps_query_and_fragment() {
        let u = normalize("https://example.com/search?q=rust#top").unwrap();
        assert_eq!(u.as_str(), "https://example.com/search?q=rust#top");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(normalize("ftp://example.com/file").is_err());
        assert!(normalize("javascript:alert(1)").is_err());
        assert!(normalize("HTTP://example.com").is_err());
        assert!(normalize("").is_err());
    }

    #[test]
    fn rejects_short_tail() {
        assert!(normalize("http://ab").is_err());
        assert!(normalize("https://").is_err());
        assert!(normalize("http://abc").is_ok());
    }

    #[test]
    fn rejects_unparseable() {
        let err = normalize("http://exa mple.com/").unwrap_err();
        assert!(matches!(err, ShortlinkError::InvalidUrl { .. }));
        assert!(normalize("http://[::1/").is_err());
    }

    #[test]
    fn host_comparison_ignores_case() {
        let u = normalize("https://Short.Example.com/abc").unwrap();
        assert_eq!(u.host(), Some("short.example.com"));
        assert!(u.has_host("SHORT.example.COM"));
        assert!(!u.has_host("example.com"));
    }
}
