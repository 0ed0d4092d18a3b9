//! Error types for shortlink.
//!
//! This module defines the error taxonomy shared by the allocation engine,
//! the store adapters and the outer crates (config, server, daemon).

/// The main error type for shortlink operations.
#[derive(Debug, thiserror::Error)]
pub enum ShortlinkError {
    /// The submitted URL is malformed or cannot be parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A caller-supplied slug fails the length or extension-suffix rules.
    #[error("Invalid slug '{slug}': {reason}")]
    InvalidSlug { slug: String, reason: String },

    /// The slug is already taken (raised by `InsertOnly` writes).
    #[error("Slug already exists: {0}")]
    SlugConflict(String),

    /// Random generation found no free slug within the retry budget
    #[error("No free slug found after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    /// The underlying store failed or could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// Malformed request at the transport boundary
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON serialization errors (wraps serde_json errors)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShortlinkError {
    /// Create an invalid URL error
    pub fn invalid_url<S: Into<String>, R: Into<String>>(url: S, reason: R) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid slug error
    pub fn invalid_slug<S: Into<String>, R: Into<String>>(slug: S, reason: R) -> Self {
        Self::InvalidSlug {
            slug: slug.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error with a message
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Create a config error with a message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid config error
    pub fn invalid_config<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. }
                | Self::InvalidSlug { .. }
                | Self::SlugConflict(_)
                | Self::InvalidRequest(_)
                | Self::Json(_)
        )
    }

    /// Check if this error is transient (the whole request may be retried)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AllocationExhausted { .. } | Self::StoreUnavailable(_)
        )
    }

    /// Short, stable identifier used for metrics labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::InvalidSlug { .. } => "invalid_slug",
            Self::SlugConflict(_) => "slug_conflict",
            Self::AllocationExhausted { .. } => "allocation_exhausted",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Config(_) | Self::InvalidConfig { .. } => "config",
            Self::InvalidRequest(_) | Self::Json(_) => "invalid_request",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for shortlink operations
pub type Result<T> = std::result::Result<T, ShortlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShortlinkError::invalid_slug("a", "length must be between 2 and 10");
        assert_eq!(
            err.to_string(),
            "Invalid slug 'a': length must be between 2 and 10"
        );
    }

    #[test]
    fn test_invalid_config_error() {
        let err = ShortlinkError::invalid_config("service.public_url", "must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for 'service.public_url': must not be empty"
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(ShortlinkError::AllocationExhausted { attempts: 20 }.is_transient());
        assert!(ShortlinkError::store("connection reset").is_transient());
        assert!(!ShortlinkError::SlugConflict("abcd".into()).is_transient());
    }

    #[test]
    fn test_client_errors() {
        assert!(ShortlinkError::invalid_url("ftp://x", "unsupported scheme").is_client_error());
        assert!(ShortlinkError::SlugConflict("abcd".into()).is_client_error());
        assert!(!ShortlinkError::Internal("boom".into()).is_client_error());
    }
}
