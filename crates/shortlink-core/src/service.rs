//! Raw-input facade over the allocation engine and the store reads.
//!
//! Transports hand over untrusted strings; [`Shortener`] normalizes and
//! validates them before the engine sees anything.

use std::sync::Arc;

use crate::engine::{AllocationEngine, AllocationRequest};
use crate::error::Result;
use crate::link::{LinkRecord, Origin};
use crate::normalize::normalize;
use crate::outcome::Outcome;
use crate::slug::{self, Slug};
use crate::store::{LinkStore, MAX_LISTING};

/// Unvalidated shorten request, as received from a client.
#[derive(Debug, Clone, Default)]
pub struct ShortenRequest {
    pub url: String,
    pub slug: Option<String>,
    pub overwrite: bool,
    pub origin: Origin,
}

impl ShortenRequest {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_slug<S: Into<String>>(mut self, slug: S) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Entry point used by the HTTP boundary.
#[derive(Clone)]
pub struct Shortener {
    engine: Arc<AllocationEngine>,
}

impl Shortener {
    pub fn new(engine: AllocationEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    fn store(&self) -> &Arc<dyn LinkStore> {
        self.engine.store()
    }

    /// Normalize, validate and allocate.
    ///
    /// The URL is checked before the slug, so a request with both wrong
    /// reports the URL.
    pub async fn shorten(&self, req: ShortenRequest) -> Result<Outcome> {
        let url = normalize(&req.url)?;
        let slug = slug::validate(req.slug.as_deref())?;

        let mut alloc = AllocationRequest::new(url)
            .with_overwrite(req.overwrite)
            .with_origin(req.origin);
        if let Some(slug) = slug {
            alloc = alloc.with_slug(slug);
        }

        self.engine.allocate(alloc).await
    }

    /// Read the record behind a slug, if any.
    pub async fn lookup(&self, slug: &str) -> Result<Option<LinkRecord>> {
        self.store().find_by_slug(&Slug::from_trusted(slug)).await
    }

    /// The most recent caller-supplied links, newest first.
    pub async fn recent_custom(&self) -> Result<Vec<LinkRecord>> {
        self.store().recent_custom(MAX_LISTING).await
    }
}
