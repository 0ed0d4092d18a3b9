//! Store adapter contract.
//!
//! The allocation engine never enforces slug uniqueness on its own. It reads
//! through [`LinkStore`] to make decisions, and relies on
//! [`UpsertMode::InsertOnly`] being atomic at the store layer: when two
//! callers race to insert the same new slug, exactly one write succeeds and
//! the other gets [`ShortlinkError::SlugConflict`].
//!
//! [`ShortlinkError::SlugConflict`]: crate::error::ShortlinkError::SlugConflict

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::link::{LinkRecord, NewLink};
use crate::normalize::NormalizedUrl;
use crate::slug::Slug;

pub use memory::MemoryStore;

/// Upper bound on rows returned by [`LinkStore::recent_custom`].
pub const MAX_LISTING: usize = 100;

/// Write semantics for [`LinkStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Fail with `SlugConflict` if the slug already exists.
    InsertOnly,

    /// Replace the record at this slug (url, origin, timestamp), creating it
    /// if absent. The slug's status is left untouched on replacement.
    Overwrite,
}

/// Persistent slug → URL mapping with a secondary lookup by URL.
#[async_trait]
pub trait LinkStore: Send + Sync + 'static {
    /// Point lookup by slug. Reflects the latest committed write.
    async fn find_by_slug(&self, slug: &Slug) -> Result<Option<LinkRecord>>;

    /// Lookup by normalized URL.
    ///
    /// When several slugs map to the same URL, the one inserted first is
    /// returned.
    async fn find_by_url(&self, url: &NormalizedUrl) -> Result<Option<LinkRecord>>;

    /// Write a mapping according to `mode`.
    async fn upsert(&self, link: NewLink, mode: UpsertMode) -> Result<()>;

    /// Caller-supplied ("custom") links, newest first, at most `limit` rows
    /// (clamped to [`MAX_LISTING`]).
    async fn recent_custom(&self, limit: usize) -> Result<Vec<LinkRecord>>;
}
