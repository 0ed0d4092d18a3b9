//! The slug allocation engine.
//!
//! Given a normalized URL, an optional validated slug and an overwrite flag,
//! [`AllocationEngine::allocate`] decides between reusing an existing mapping,
//! rejecting a conflicting request, overwriting under explicit consent, or
//! writing a new mapping. The checks run in a fixed order:
//!
//! 1. Slug given: look it up. Same URL → `Reused`; different URL →
//!    `Conflict`, or `Overwritten` when `overwrite` is set; absent → write it.
//! 2. No slug: look up the URL. Found → `Reused` with that record's slug.
//! 3. Target host is the service's own host → `SameDomainRejected`. This runs
//!    after the reuse checks (and before an overwrite is written), so
//!    pre-existing self-referencing records are still served while no new
//!    ones can be created.
//! 4. Write with an insert-only upsert. Caller slugs get exactly one attempt;
//!    generated slugs are retried on collision up to `max_attempts`.
//!
//! The engine holds no mutable state of its own. Uniqueness is the store's
//! job; the engine only reacts to `SlugConflict`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, ShortlinkError};
use crate::link::{LinkStatus, NewLink, Origin};
use crate::normalize::NormalizedUrl;
use crate::outcome::Outcome;
use crate::slug::{RandomSlugs, Slug, SlugSource};
use crate::store::{LinkStore, UpsertMode};

/// Default cap on random candidates tried for a single request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Inputs to a single allocation.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub url: NormalizedUrl,
    pub slug: Option<Slug>,
    pub overwrite: bool,
    pub origin: Origin,
}

impl AllocationRequest {
    /// Request a generated slug for `url`.
    pub fn new(url: NormalizedUrl) -> Self {
        Self {
            url,
            slug: None,
            overwrite: false,
            origin: Origin::default(),
        }
    }

    /// Ask for a specific slug
    pub fn with_slug(mut self, slug: Slug) -> Self {
        self.slug = Some(slug);
        self
    }

    /// Allow replacing an existing mapping at the requested slug
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Attach creator provenance
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Decides and performs slug allocations against a [`LinkStore`].
pub struct AllocationEngine {
    store: Arc<dyn LinkStore>,
    slugs: Arc<dyn SlugSource>,
    own_host: String,
    max_attempts: u32,
}

impl AllocationEngine {
    /// Create an engine for a service reachable at `own_host`.
    ///
    /// Uses [`RandomSlugs`] with the default length and
    /// [`DEFAULT_MAX_ATTEMPTS`].
    pub fn new<S: Into<String>>(store: Arc<dyn LinkStore>, own_host: S) -> Self {
        let own_host: String = own_host.into();
        Self {
            store,
            slugs: Arc::new(RandomSlugs::default()),
            own_host: own_host.to_ascii_lowercase(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Replace the candidate source
    pub fn with_slug_source(mut self, slugs: Arc<dyn SlugSource>) -> Self {
        self.slugs = slugs;
        self
    }

    /// Set the retry budget for generated slugs (at least one attempt)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// The host this service serves short links from.
    pub fn own_host(&self) -> &str {
        &self.own_host
    }

    pub fn store(&self) -> &Arc<dyn LinkStore> {
        &self.store
    }

    /// Run the allocation algorithm for one request.
    pub async fn allocate(&self, req: AllocationRequest) -> Result<Outcome> {
        let AllocationRequest {
            url,
            slug,
            overwrite,
            origin,
        } = req;

        match slug {
            Some(slug) => self.allocate_custom(url, slug, overwrite, origin).await,
            None => self.allocate_generated(url, origin).await,
        }
    }

    async fn allocate_custom(
        &self,
        url: NormalizedUrl,
        slug: Slug,
        overwrite: bool,
        origin: Origin,
    ) -> Result<Outcome> {
        if let Some(existing) = self.store.find_by_slug(&slug).await? {
            if existing.points_to(&url) {
                debug!(slug = %slug, "slug already maps to the requested url");
                return Ok(Outcome::Reused { slug });
            }

            if !overwrite {
                debug!(slug = %slug, existing = %existing.url, "slug taken by another url");
                return Ok(Outcome::Conflict {
                    slug,
                    existing_url: existing.url,
                });
            }

            // Replacing the target is still a new mapping as far as the
            // self-reference rule is concerned.
            if self.is_own_host(&url) {
                return Ok(Outcome::SameDomainRejected);
            }

            let link = NewLink::new(slug.clone(), url, origin, LinkStatus::Custom);
            self.store.upsert(link, UpsertMode::Overwrite).await?;
            debug!(slug = %slug, previous = %existing.url, "overwrote existing mapping");
            return Ok(Outcome::Overwritten { slug });
        }

        if self.is_own_host(&url) {
            return Ok(Outcome::SameDomainRejected);
        }

        let link = NewLink::new(slug.clone(), url.clone(), origin, LinkStatus::Custom);
        match self.store.upsert(link, UpsertMode::InsertOnly).await {
            Ok(()) => {
                debug!(slug = %slug, url = %url, "created custom mapping");
                Ok(Outcome::Created { slug })
            }
            Err(ShortlinkError::SlugConflict(_)) => self.resolve_lost_race(url, slug).await,
            Err(e) => Err(e),
        }
    }

    /// Another request inserted `slug` between our lookup and our insert.
    ///
    /// The caller asked for this exact slug, so there is no retry under a
    /// different one: report whatever the winner wrote.
    async fn resolve_lost_race(&self, url: NormalizedUrl, slug: Slug) -> Result<Outcome> {
        let winner = self.store.find_by_slug(&slug).await?.ok_or_else(|| {
            ShortlinkError::Internal(format!(
                "slug '{}' reported as taken but cannot be read back",
                slug
            ))
        })?;

        if winner.points_to(&url) {
            debug!(slug = %slug, "lost insert race to an identical mapping");
            return Ok(Outcome::Reused { slug });
        }

        debug!(slug = %slug, existing = %winner.url, "lost insert race");
        Ok(Outcome::Conflict {
            slug,
            existing_url: winner.url,
        })
    }

    async fn allocate_generated(&self, url: NormalizedUrl, origin: Origin) -> Result<Outcome> {
        if let Some(existing) = self.store.find_by_url(&url).await? {
            debug!(slug = %existing.slug, "url already shortened");
            return Ok(Outcome::Reused {
                slug: existing.slug,
            });
        }

        if self.is_own_host(&url) {
            return Ok(Outcome::SameDomainRejected);
        }

        for attempt in 1..=self.max_attempts {
            let slug = Slug::from_trusted(self.slugs.candidate());
            let link = NewLink::new(slug.clone(), url.clone(), origin.clone(), LinkStatus::Generated);

            match self.store.upsert(link, UpsertMode::InsertOnly).await {
                Ok(()) => {
                    debug!(slug = %slug, url = %url, attempt, "created generated mapping");
                    return Ok(Outcome::Created { slug });
                }
                Err(ShortlinkError::SlugConflict(_)) => {
                    debug!(slug = %slug, attempt, "generated slug collided, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            url = %url,
            attempts = self.max_attempts,
            "no free slug found within the retry budget"
        );
        Err(ShortlinkError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }

    fn is_own_host(&self, url: &NormalizedUrl) -> bool {
        url.has_host(&self.own_host)
    }
}
