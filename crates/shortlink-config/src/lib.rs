//! Configuration loading and types for shortlink.
//!
//! This crate is responsible for:
//! - Defining the configuration model consumed by the daemon and server
//! - Loading configuration from TOML files
//! - Providing a simple default search strategy (/etc/shortlink/shortlink.toml, ./shortlink.toml)
//!
//! Business logic lives in `shortlink-core`; this crate only turns operator
//! input into validated values.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use shortlink_core::slug::{DEFAULT_GENERATED_LEN, MAX_SLUG_LEN, MIN_SLUG_LEN};
use shortlink_core::{Result, ShortlinkError, DEFAULT_MAX_ATTEMPTS};

/// Root configuration struct for shortlink.
#[derive(Debug, Clone, Deserialize)]
pub struct ShortlinkConfig {
    /// Public identity of the service.
    pub service: ServiceConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Slug generation settings.
    #[serde(default)]
    pub slugs: SlugConfig,

    /// Storage backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

impl ShortlinkConfig {
    /// Perform structural validation of the configuration.
    ///
    /// This does not open the store or bind any sockets; it only checks for
    /// obviously invalid or inconsistent values.
    pub fn validate(&self) -> Result<()> {
        self.service.parsed_public_url()?;
        self.validate_server()?;
        self.validate_slugs()?;
        self.validate_store()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<()> {
        self.server.socket_addr().map(|_| ())
    }

    fn validate_slugs(&self) -> Result<()> {
        let len = self.slugs.generated_length;
        if !(MIN_SLUG_LEN..=MAX_SLUG_LEN).contains(&len) {
            return Err(ShortlinkError::invalid_config(
                "slugs.generated_length",
                format!(
                    "must be between {} and {} (got {})",
                    MIN_SLUG_LEN, MAX_SLUG_LEN, len
                ),
            ));
        }

        if self.slugs.max_attempts == 0 {
            return Err(ShortlinkError::invalid_config(
                "slugs.max_attempts",
                "slugs.max_attempts must be at least 1",
            ));
        }

        Ok(())
    }

    fn validate_store(&self) -> Result<()> {
        if self.store.backend == StoreBackend::Sqlite {
            let path = self.store.path.as_deref().unwrap_or("");
            if path.trim().is_empty() {
                return Err(ShortlinkError::invalid_config(
                    "store.path",
                    "store.path is required for the sqlite backend",
                ));
            }
        }
        Ok(())
    }

    /// Whether the `/metrics` endpoint should be served.
    ///
    /// Metrics are enabled unless `telemetry.disable_metrics = true`.
    pub fn metrics_enabled(&self) -> bool {
        self.telemetry
            .as_ref()
            .map(|t| !t.disable_metrics)
            .unwrap_or(true)
    }
}

/// Service identity section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Public base URL short links are served from, e.g. `https://s.example.com`.
    ///
    /// Its host is the "own host" for the self-reference check and its origin
    /// prefixes every short link handed back to clients.
    pub public_url: String,
}

impl ServiceConfig {
    fn parsed_public_url(&self) -> Result<Url> {
        let raw = self.public_url.trim();
        if raw.is_empty() {
            return Err(ShortlinkError::invalid_config(
                "service.public_url",
                "service.public_url must not be empty",
            ));
        }

        let url = Url::parse(raw).map_err(|e| {
            ShortlinkError::invalid_config("service.public_url", format!("failed to parse: {}", e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ShortlinkError::invalid_config(
                "service.public_url",
                "service.public_url must start with http:// or https://",
            ));
        }

        if url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(ShortlinkError::invalid_config(
                "service.public_url",
                "service.public_url must include a host",
            ));
        }

        Ok(url)
    }

    /// Host name of the service, lower-cased.
    pub fn host(&self) -> Result<String> {
        let url = self.parsed_public_url()?;
        Ok(url.host_str().unwrap_or_default().to_ascii_lowercase())
    }

    /// Scheme, host and port without a trailing slash, e.g. `https://s.example.com`.
    pub fn origin(&self) -> Result<String> {
        let url = self.parsed_public_url()?;
        Ok(url.origin().ascii_serialization())
    }
}

/// HTTP listener section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Address to bind, defaults to `0.0.0.0:8080`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl ServerSection {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.trim().parse::<SocketAddr>().map_err(|e| {
            ShortlinkError::invalid_config(
                "server.listen_addr",
                format!("failed to parse '{}': {}", self.listen_addr, e),
            )
        })
    }
}

/// Slug generation section.
#[derive(Debug, Clone, Deserialize)]
pub struct SlugConfig {
    /// Length of generated slugs (default 4).
    #[serde(default = "default_generated_length")]
    pub generated_length: usize,

    /// Random candidates tried per request before giving up (default 20).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SlugConfig {
    fn default() -> Self {
        Self {
            generated_length: default_generated_length(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Which [`shortlink_core::LinkStore`] implementation to run.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Volatile in-process store.
    #[default]
    Memory,

    /// SQLite database file.
    Sqlite,
}

/// Storage section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend.
    #[serde(default)]
    pub path: Option<String>,
}

/// Telemetry section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Default log filter when neither `--log-level` nor `RUST_LOG` is given.
    #[serde(default)]
    pub log_level: Option<String>,

    /// Turn off the `/metrics` endpoint.
    #[serde(default)]
    pub disable_metrics: bool,
}

/// Load configuration from a specific file path.
///
/// This function parses TOML into [`ShortlinkConfig`] and maps errors into
/// [`ShortlinkError::Config`] / [`ShortlinkError::InvalidConfig`] as appropriate.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ShortlinkConfig> {
    let path_ref = path.as_ref();
    let contents = fs::read_to_string(path_ref).map_err(|err| {
        ShortlinkError::config(format!(
            "failed to read config file '{}': {}",
            path_ref.display(),
            err
        ))
    })?;

    parse(&contents).map_err(|err| match err {
        ShortlinkError::Config(message) => {
            ShortlinkError::invalid_config(path_ref.display().to_string(), message)
        }
        other => other,
    })
}

/// Parse configuration from a TOML string.
pub fn parse(contents: &str) -> Result<ShortlinkConfig> {
    toml::from_str(contents)
        .map_err(|err| ShortlinkError::config(format!("failed to parse config: {}", err)))
}

/// Attempt to load configuration using the default search strategy.
///
/// Current strategy (in order):
/// 1. `/etc/shortlink/shortlink.toml`
/// 2. `./shortlink.toml` (in the current working directory)
pub fn load_default() -> Result<ShortlinkConfig> {
    let candidates = [
        PathBuf::from("/etc/shortlink/shortlink.toml"),
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("shortlink.toml"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return load_from_path(candidate);
        }
    }

    Err(ShortlinkError::config(
        "no configuration file found; provide a path explicitly or create /etc/shortlink/shortlink.toml or ./shortlink.toml",
    ))
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_generated_length() -> usize {
    DEFAULT_GENERATED_LEN
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
