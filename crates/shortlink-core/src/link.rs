//! Link records and their provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::normalize::NormalizedUrl;
use crate::slug::Slug;

/// A persisted slug → URL mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRecord {
    /// Unique short identifier (primary key)
    pub slug: Slug,

    /// Normalized long URL this slug points at
    pub url: String,

    /// Time of creation or of the last overwrite
    pub created_at: DateTime<Utc>,

    /// Who created (or last overwrote) the mapping
    pub origin: Origin,

    /// Whether the slug was generated or supplied by the caller
    pub status: LinkStatus,
}

impl LinkRecord {
    /// Whether this record already points at `url`.
    pub fn points_to(&self, url: &NormalizedUrl) -> bool {
        self.url == url.as_str()
    }
}

/// Creator identity, kept for provenance only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Origin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Origin {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }

    /// Set the client address
    pub fn with_ip<S: Into<String>>(mut self, ip: S) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Set the client user agent
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// How a slug came to exist.
///
/// The numeric codes match the persisted `status` column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Drawn from the random generator
    Generated,

    /// Requested explicitly by the caller
    Custom,
}

impl LinkStatus {
    pub fn code(self) -> i64 {
        match self {
            Self::Generated => 1,
            Self::Custom => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Generated),
            2 => Some(Self::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// A mapping to be written by [`crate::store::LinkStore::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub slug: Slug,
    pub url: NormalizedUrl,
    pub origin: Origin,
    pub status: LinkStatus,
    pub created_at: DateTime<Utc>,
}

impl NewLink {
    /// Build a new mapping stamped with the current time
    pub fn new(slug: Slug, url: NormalizedUrl, origin: Origin, status: LinkStatus) -> Self {
        Self {
            slug,
            url,
            origin,
            status,
            created_at: Utc::now(),
        }
    }

    /// Turn the write into the record a store would hold after inserting it.
    pub fn into_record(self) -> LinkRecord {
        LinkRecord {
            slug: self.slug,
            url: self.url.as_str().to_string(),
            created_at: self.created_at,
            origin: self.origin,
            status: self.status,
        }
    }
}
