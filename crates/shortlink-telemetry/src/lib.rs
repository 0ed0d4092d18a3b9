use std::env;
use std::str::FromStr;

use time::{format_description, UtcOffset};
use tracing::Level;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;

#[cfg(feature = "prometheus")]
pub use crate::prometheus_impl::PrometheusMetricsRecorder;

/// Error type for telemetry initialisation failures.
///
/// This is intentionally lightweight so `shortlink-telemetry` can be used
/// without depending on `shortlink-core`. Callers can map this into their own
/// error types as needed.
#[derive(Debug)]
pub enum TelemetryError {
    /// Provided log level string could not be parsed.
    InvalidLevel(String),

    /// Failed to configure the subscriber (should be rare).
    SubscriberInit(String),
}

impl std::fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryError::InvalidLevel(level) => {
                write!(f, "invalid log level: {}", level)
            }
            TelemetryError::SubscriberInit(msg) => write!(f, "failed to init telemetry: {}", msg),
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// A rendered metrics payload, ready to be served over HTTP.
#[derive(Debug, Clone)]
pub struct MetricsExport {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Interface for recording shortener metrics.
///
/// Call sites only see this trait, so the backend (Prometheus or nothing at
/// all) is chosen once at startup.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Record a finished allocation.
    ///
    /// - `outcome`: stable outcome label ("created", "reused", "conflict", ...).
    /// - `latency_secs`: time spent in the engine, if measured.
    fn record_allocation(&self, outcome: &str, latency_secs: Option<f64>);

    /// Record a slug lookup and whether it found a record.
    fn record_lookup(&self, found: bool);

    /// Record an error by kind (e.g. "invalid_url", "store_unavailable").
    fn record_error(&self, kind: &str);

    /// Render the current metrics, if this backend supports exporting.
    fn export(&self) -> Option<MetricsExport> {
        None
    }
}

/// A no-op metrics recorder that does nothing.
///
/// This is useful as a default implementation in environments where metrics
/// are not configured or desired.
#[derive(Debug, Clone, Default)]
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn record_allocation(&self, _outcome: &str, _latency_secs: Option<f64>) {}

    fn record_lookup(&self, _found: bool) {}

    fn record_error(&self, _kind: &str) {}
}

#[cfg(feature = "prometheus")]
pub mod prometheus_impl {
    use super::*;

    use prometheus::{
        Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    };

    /// Prometheus-backed metrics recorder.
    ///
    /// This is behind the `prometheus` feature flag so that deployments which do
    /// not require metrics do not have to pull in the Prometheus stack.
    #[derive(Clone)]
    pub struct PrometheusMetricsRecorder {
        registry: Registry,
        allocations_total: IntCounterVec,
        allocation_latency_seconds: HistogramVec,
        lookups_total: IntCounterVec,
        errors_total: IntCounterVec,
    }

    impl PrometheusMetricsRecorder {
        /// Create a new Prometheus-backed recorder with a fresh registry.
        pub fn new() -> std::result::Result<Self, prometheus::Error> {
            let registry = Registry::new();

            let allocations_total = IntCounterVec::new(
                Opts::new("allocations_total", "Allocation requests by outcome")
                    .namespace("shortlink"),
                &["outcome"],
            )?;
            registry.register(Box::new(allocations_total.clone()))?;

            let allocation_latency_seconds = HistogramVec::new(
                HistogramOpts::new(
                    "allocation_latency_seconds",
                    "Time spent allocating a slug, in seconds",
                )
                .namespace("shortlink"),
                &["outcome"],
            )?;
            registry.register(Box::new(allocation_latency_seconds.clone()))?;

            let lookups_total = IntCounterVec::new(
                Opts::new("lookups_total", "Slug lookups by result").namespace("shortlink"),
                &["found"],
            )?;
            registry.register(Box::new(lookups_total.clone()))?;

            let errors_total = IntCounterVec::new(
                Opts::new("errors_total", "Errors by kind").namespace("shortlink"),
                &["kind"],
            )?;
            registry.register(Box::new(errors_total.clone()))?;

            Ok(Self {
                registry,
                allocations_total,
                allocation_latency_seconds,
                lookups_total,
                errors_total,
            })
        }

        /// Access the underlying Prometheus registry.
        pub fn registry(&self) -> &Registry {
            &self.registry
        }
    }

    impl MetricsRecorder for PrometheusMetricsRecorder {
        fn record_allocation(&self, outcome: &str, latency_secs: Option<f64>) {
            self.allocations_total.with_label_values(&[outcome]).inc();

            if let Some(lat) = latency_secs {
                self.allocation_latency_seconds
                    .with_label_values(&[outcome])
                    .observe(lat);
            }
        }

        fn record_lookup(&self, found: bool) {
            let found_label = if found { "true" } else { "false" };
            self.lookups_total.with_label_values(&[found_label]).inc();
        }

        fn record_error(&self, kind: &str) {
            self.errors_total.with_label_values(&[kind]).inc();
        }

        fn export(&self) -> Option<MetricsExport> {
            let encoder = TextEncoder::new();
            let mut body = Vec::new();
            if let Err(err) = encoder.encode(&self.registry.gather(), &mut body) {
                tracing::error!("failed to encode Prometheus metrics: {}", err);
                return None;
            }
            Some(MetricsExport {
                content_type: encoder.format_type().to_string(),
                body,
            })
        }
    }
}

/// Initialise the global telemetry / logging subscriber.
///
/// This sets up a `tracing_subscriber` using `EnvFilter` and a formatted
/// output layer. It is intended to be called once at process startup.
///
/// # Parameters
///
/// - `level`: Optional log level string. If `None`, the function will:
///   - Respect `RUST_LOG` if it is set, or
///   - Default to `"info"` otherwise.
///   If `Some(level)` is provided, it takes precedence over `RUST_LOG`.
///
/// # Examples
///
/// ```ignore
/// shortlink_telemetry::init(None)?;
/// shortlink_telemetry::init(Some("info,shortlink_core=debug"))?;
/// ```
pub fn init(level: Option<&str>) -> Result<()> {
    let filter = if let Some(level_str) = level {
        parse_level_filter(level_str)?
    } else if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };

    let timer_format = format_description::parse(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]",
    )
    .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_timer(OffsetTime::new(
            // Falls back to UTC if the local offset cannot be determined.
            UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            timer_format,
        ));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    Ok(())
}

/// Parse a simple level string into an `EnvFilter`.
///
/// Supports both plain levels ("info", "debug", etc.) and full `EnvFilter`
/// expressions (like "info,shortlink_core=debug").
fn parse_level_filter(level_str: &str) -> Result<EnvFilter> {
    if Level::from_str(level_str).is_ok() {
        return Ok(EnvFilter::new(level_str));
    }

    EnvFilter::builder()
        .parse(level_str)
        .map_err(|e| TelemetryError::InvalidLevel(format!("{} ({})", level_str, e)))
}
