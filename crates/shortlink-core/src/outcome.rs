//! Allocation outcomes and their classification for transport boundaries.

use serde::Serialize;
use std::fmt;

use crate::error::{Result, ShortlinkError};
use crate::slug::Slug;

/// Result of a successful run of the allocation algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// An existing mapping already satisfies the request; nothing was written.
    Reused { slug: Slug },

    /// The requested slug maps to a different URL and overwrite was not set.
    Conflict { slug: Slug, existing_url: String },

    /// The requested slug pointed elsewhere and was replaced.
    Overwritten { slug: Slug },

    /// A new mapping was written.
    Created { slug: Slug },

    /// The target is the service's own host.
    SameDomainRejected,
}

impl Outcome {
    /// The slug the caller should use, for outcomes that produce one.
    pub fn slug(&self) -> Option<&Slug> {
        match self {
            Self::Reused { slug } | Self::Overwritten { slug } | Self::Created { slug } => {
                Some(slug)
            }
            Self::Conflict { .. } | Self::SameDomainRejected => None,
        }
    }

    /// Short, stable label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reused { .. } => "reused",
            Self::Conflict { .. } => "conflict",
            Self::Overwritten { .. } => "overwritten",
            Self::Created { .. } => "created",
            Self::SameDomainRejected => "same_domain",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reused { slug } => write!(f, "reused {}", slug),
            Self::Conflict { slug, existing_url } => {
                write!(f, "slug {} already maps to {}", slug, existing_url)
            }
            Self::Overwritten { slug } => write!(f, "overwrote {}", slug),
            Self::Created { slug } => write!(f, "created {}", slug),
            Self::SameDomainRejected => write!(f, "target is on the service's own domain"),
        }
    }
}

/// Coarse classification of an allocation result.
///
/// Transports map this onto their own status representation (HTTP status
/// codes, exit codes, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// The caller has a usable slug.
    Accepted,

    /// The requested slug is taken by another URL.
    Conflict,

    /// The request itself is unacceptable; retrying it unchanged will fail
    /// again.
    Rejected,

    /// Temporary server-side failure; the whole request may be retried.
    Unavailable,

    /// Server-side failure.
    Failed,
}

/// Classify the result of [`crate::engine::AllocationEngine::allocate`] or
/// [`crate::service::Shortener::shorten`].
pub fn classify(result: &Result<Outcome>) -> Disposition {
    match result {
        Ok(Outcome::Reused { .. } | Outcome::Overwritten { .. } | Outcome::Created { .. }) => {
            Disposition::Accepted
        }
        Ok(Outcome::Conflict { .. }) => Disposition::Conflict,
        Ok(Outcome::SameDomainRejected) => Disposition::Rejected,
        Err(err) => classify_error(err),
    }
}

/// Classify an error on its own.
pub fn classify_error(err: &ShortlinkError) -> Disposition {
    match err {
        ShortlinkError::SlugConflict(_) => Disposition::Conflict,
        ShortlinkError::AllocationExhausted { .. } => Disposition::Unavailable,
        e if e.is_client_error() => Disposition::Rejected,
        _ => Disposition::Failed,
    }
}
