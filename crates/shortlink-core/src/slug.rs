//! Slug validation and random slug generation.
//!
//! A slug is the short path segment that maps to a long URL. Slugs come from
//! two places:
//!
//! - **Callers** may ask for a specific ("custom") slug. These go through
//!   [`validate`], which enforces:
//!     - a length between [`MIN_SLUG_LEN`] and [`MAX_SLUG_LEN`] UTF-16 code
//!       units, the way browsers count string length;
//!     - no trailing file-extension-like suffix (`ab.png`), so slugs never
//!       look like static asset paths.
//! - **The engine** generates candidates through a [`SlugSource`]. The
//!   default [`RandomSlugs`] draws characters uniformly, with replacement,
//!   from a 62-character alphanumeric alphabet:
//!
//! ```text
//! 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz
//! ```
//!
//! Note: generation is not a security primitive. Collision resistance comes
//! from the store's atomic uniqueness check plus retry, not from the
//! unpredictability of the generator.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShortlinkError};

/// Shortest accepted custom slug, in UTF-16 code units.
pub const MIN_SLUG_LEN: usize = 2;

/// Longest accepted custom slug, in UTF-16 code units.
pub const MAX_SLUG_LEN: usize = 10;

/// Default length of generated slugs.
pub const DEFAULT_GENERATED_LEN: usize = 4;

/// Characters used for generated slugs.
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// A slug that is safe to write to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Validate a caller-supplied slug.
    pub fn parse<S: Into<String>>(raw: S) -> Result<Self> {
        let raw = raw.into();
        let len = raw.encode_utf16().count();
        if !(MIN_SLUG_LEN..=MAX_SLUG_LEN).contains(&len) {
            return Err(ShortlinkError::invalid_slug(
                raw,
                format!(
                    "length must be between {} and {} UTF-16 code units",
                    MIN_SLUG_LEN, MAX_SLUG_LEN
                ),
            ));
        }
        if has_extension_suffix(&raw) {
            return Err(ShortlinkError::invalid_slug(
                raw,
                "must not end with a file extension",
            ));
        }
        Ok(Self(raw))
    }

    /// Wrap a value that is already known to be a valid slug, such as one read
    /// back from the store or produced by a [`SlugSource`].
    pub fn from_trusted<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate an optional caller-supplied slug.
///
/// `None` means "generate one for me" and skips validation entirely. An
/// empty string is treated the same way, since request bodies commonly send
/// `"slug": ""` for an unset field.
pub fn validate(raw: Option<&str>) -> Result<Option<Slug>> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => Slug::parse(s).map(Some),
    }
}

/// One or more characters, a literal `.`, then one or more ASCII letters up
/// to the end of the string.
fn has_extension_suffix(s: &str) -> bool {
    let Some(dot) = s.rfind('.') else {
        return false;
    };
    let ext = &s[dot + 1..];
    dot > 0 && !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphabetic())
}

/// A source of candidate slugs for the allocation engine.
///
/// Candidates are only proposals: the engine writes each one with an
/// insert-only store operation and asks for another on collision.
pub trait SlugSource: Send + Sync {
    /// Produce the next candidate slug.
    fn candidate(&self) -> String;
}

/// Uniformly random slugs over [`ALPHABET`].
#[derive(Debug, Clone)]
pub struct RandomSlugs {
    length: usize,
}

impl RandomSlugs {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomSlugs {
    fn default() -> Self {
        Self::new(DEFAULT_GENERATED_LEN)
    }
}

impl SlugSource for RandomSlugs {
    fn candidate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_slug_skips_validation() {
        assert_eq!(validate(None).unwrap(), None);
        assert_eq!(validate(Some("")).unwrap(), None);
    }

    #[test]
    fn length_boundaries() {
        assert!(validate(Some("a")).is_err());
        assert!(validate(Some("ab")).is_ok());
        assert!(validate(Some("abcdefghij")).is_ok());
        assert!(validate(Some("abcdefghijk")).is_err());
    }

    #[test]
    fn length_counts_utf16_units_not_bytes() {
        // 5 characters, 10 bytes, 5 UTF-16 units
        assert!(validate(Some("ééééé")).is_ok());
        // 6 characters, 12 UTF-16 units
        assert!(validate(Some("😀😀😀😀😀😀")).is_err());
        // 1 character, 2 UTF-16 units
        assert!(validate(Some("😀")).is_ok());
    }

    #[test]
    fn rejects_extension_like_suffix() {
        assert!(validate(Some("ab.png")).is_err());
        assert!(validate(Some("x.js")).is_err());
        assert!(validate(Some("a.b.HTML")).is_err());
    }

    #[test]
    fn accepts_dots_that_are_not_extensions() {
        assert_eq!(validate(Some("abcd")).unwrap().unwrap().as_str(), "abcd");
        assert!(validate(Some(".png")).is_ok());
        assert!(validate(Some("v1.2")).is_ok());
        assert!(validate(Some("ab.")).is_ok());
        assert!(validate(Some("ab.p1")).is_ok());
    }

    #[test]
    fn random_slugs_have_requested_length() {
        let source = RandomSlugs::new(6);
        for _ in 0..100 {
            let s = source.candidate();
            assert_eq!(s.len(), 6);
            assert!(s.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn default_length_is_four() {
        assert_eq!(RandomSlugs::default().candidate().len(), 4);
    }

    #[test]
    fn random_slugs_pass_validation() {
        let source = RandomSlugs::default();
        for _ in 0..100 {
            assert!(Slug::parse(source.candidate()).is_ok());
        }
    }
}
