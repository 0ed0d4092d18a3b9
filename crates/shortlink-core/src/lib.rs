//! Core types, errors, and the slug allocation engine for shortlink.
//!
//! This crate provides everything that decides how long URLs map to slugs:
//!
//! - **URL normalization**: [`normalize::normalize`] and [`NormalizedUrl`]
//! - **Slugs**: validation of caller slugs and random generation via [`SlugSource`]
//! - **Store contract**: the [`LinkStore`] trait and the in-process [`MemoryStore`]
//! - **Allocation**: [`AllocationEngine`] and its [`Outcome`]s
//! - **Classification**: [`classify`] maps results onto a transport-neutral [`Disposition`]
//! - **Errors**: [`ShortlinkError`] and [`Result`]
//!
//! # Overview
//!
//! shortlink-core has no knowledge of HTTP, configuration files or concrete
//! databases. Transports call [`Shortener`], stores implement [`LinkStore`].
//!
//! # Examples
//!
//! ## Shortening a URL
//!
//! ```rust
//! use std::sync::Arc;
//! use shortlink_core::{AllocationEngine, MemoryStore, Outcome, ShortenRequest, Shortener};
//!
//! # tokio_test_block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let shortener = Shortener::new(AllocationEngine::new(store, "s.example.com"));
//!
//! let first = shortener.shorten(ShortenRequest::new("https://example.com/a")).await.unwrap();
//! let again = shortener.shorten(ShortenRequest::new("https://EXAMPLE.com/a")).await.unwrap();
//!
//! assert!(matches!(first, Outcome::Created { .. }));
//! assert_eq!(first.slug(), again.slug());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! ## Error handling
//!
//! ```rust
//! use shortlink_core::{Disposition, ShortlinkError, classify_error};
//!
//! let err = ShortlinkError::invalid_slug("a", "too short");
//! assert_eq!(classify_error(&err), Disposition::Rejected);
//! ```

pub mod engine;
pub mod error;
pub mod link;
pub mod normalize;
pub mod outcome;
pub mod service;
pub mod slug;
pub mod store;

// Re-export commonly used types for convenience
pub use engine::{AllocationEngine, AllocationRequest, DEFAULT_MAX_ATTEMPTS};
pub use error::{Result, ShortlinkError};
pub use link::{LinkRecord, LinkStatus, NewLink, Origin};
pub use normalize::NormalizedUrl;
pub use outcome::{classify, classify_error, Disposition, Outcome};
pub use service::{ShortenRequest, Shortener};
pub use slug::{RandomSlugs, Slug, SlugSource};
pub use store::{LinkStore, MemoryStore, UpsertMode, MAX_LISTING};

/// Prelude module for convenient imports.
///
/// ```rust
/// use shortlink_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::engine::{AllocationEngine, AllocationRequest};
    pub use crate::error::{Result, ShortlinkError};
    pub use crate::link::{LinkRecord, Origin};
    pub use crate::outcome::{Disposition, Outcome};
    pub use crate::store::LinkStore;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _origin = Origin::default();
        let _error = ShortlinkError::config("test");
        let _disposition = Disposition::Accepted;
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(returns_result().unwrap(), 42);
    }
}
