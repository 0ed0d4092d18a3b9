use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use shortlink_config::{load_default, load_from_path, ShortlinkConfig, StoreBackend, StoreConfig};
use shortlink_core::{
    AllocationEngine, LinkStore, MemoryStore, RandomSlugs, ShortlinkError, Shortener,
};
use shortlink_server::{ServerConfig, ShortlinkServer};
use shortlink_sqlite::SqliteStore;
use shortlink_telemetry::{MetricsRecorder, NoopMetricsRecorder};
use tracing::{info, warn};

/// shortlinkd - shortlink daemon
///
/// Configuration discovery rules:
/// 1. If `--config PATH` (or `-c PATH`) is provided, that path is used.
/// 2. Otherwise, `shortlink_config::load_default()` is used, which checks:
///    - `/etc/shortlink/shortlink.toml`
///    - `./shortlink.toml`
#[derive(Debug, Parser)]
#[command(
    name = "shortlinkd",
    version,
    about = "shortlink daemon",
    long_about = "shortlinkd serves the shortlink HTTP API: it maps long URLs to short slugs and answers slug lookups.",
    disable_help_subcommand = true
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When provided, this path is used instead of the default search locations.
    #[arg(long = "config", short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level for shortlinkd (overrides RUST_LOG and `telemetry.log_level`).
    ///
    /// Accepts standard tracing levels (trace, debug, info, warn, error) or a
    /// full filter expression (e.g. "info,shortlink_core=debug").
    #[arg(long = "log-level", short = 'L', value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print loaded configuration summary and exit without starting the daemon.
    #[arg(long = "print-config", action = ArgAction::SetTrue)]
    print_config: bool,

    /// Address for the HTTP server to bind on, overriding `server.listen_addr`.
    #[arg(long = "bind-addr", value_name = "ADDR")]
    bind_addr: Option<String>,

    /// Validate configuration and exit without starting the daemon.
    #[arg(long = "check-config", action = ArgAction::SetTrue)]
    check_config: bool,
}

fn main() {
    let cli = Cli::parse();

    // Configuration is read before the subscriber exists so that
    // `telemetry.log_level` can take part in picking the filter. Failures are
    // reported once logging is up.
    let loaded = load_config(&cli);

    if let Err(err) = shortlink_telemetry::init(resolve_log_level(&cli, loaded.as_ref().ok()).as_deref())
    {
        eprintln!("shortlinkd: failed to initialise telemetry: {}", err);
        process::exit(1);
    }

    let config = match loaded {
        Ok((cfg, source)) => {
            info!("loaded configuration from {}", source);
            cfg
        }
        Err(err) => {
            tracing::error!("failed to load configuration: {}", err);
            process::exit(1);
        }
    };

    // Perform structural validation before any further processing.
    if let Err(err) = config.validate() {
        tracing::error!("configuration validation failed: {}", err);
        process::exit(1);
    }

    if cli.check_config {
        info!("configuration is valid");
        return;
    }

    if cli.print_config {
        print_config_summary(&config);
        return;
    }

    let bind_addr = match resolve_bind_addr(&cli, &config) {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!("invalid bind address: {}", err);
            process::exit(1);
        }
    };

    let metrics = build_metrics_recorder(&config);

    if let Err(err) = run_blocking(config, bind_addr, metrics) {
        tracing::error!("shortlink HTTP server terminated with error: {}", err);
        process::exit(1);
    }
}

/// Load configuration, returning it together with a description of where it
/// came from.
fn load_config(cli: &Cli) -> Result<(ShortlinkConfig, String), ShortlinkError> {
    match cli.config {
        Some(ref path) => load_from_path(path).map(|cfg| (cfg, path.display().to_string())),
        None => load_default().map(|cfg| (cfg, "default locations".to_string())),
    }
}

/// Pick the log filter handed to `shortlink_telemetry::init`.
///
/// Priority: `--log-level`, then `RUST_LOG` (by returning `None`), then
/// `telemetry.log_level` from configuration.
fn resolve_log_level(cli: &Cli, loaded: Option<&(ShortlinkConfig, String)>) -> Option<String> {
    if cli.log_level.is_some() {
        return cli.log_level.clone();
    }
    if env::var("RUST_LOG").is_ok() {
        return None;
    }
    loaded
        .and_then(|(cfg, _)| cfg.telemetry.as_ref())
        .and_then(|t| t.log_level.clone())
}

/// Resolve the bind address for the HTTP server.
///
/// Priority:
/// 1. `--bind-addr` CLI flag if provided.
/// 2. `[server].listen_addr` from configuration.
fn resolve_bind_addr(cli: &Cli, cfg: &ShortlinkConfig) -> Result<SocketAddr, String> {
    if let Some(addr_str) = cli.bind_addr.as_deref() {
        return addr_str
            .parse::<SocketAddr>()
            .map_err(|e| format!("failed to parse --bind-addr '{}': {}", addr_str, e));
    }

    cfg.server.socket_addr().map_err(|e| e.to_string())
}

/// Choose the metrics backend.
///
/// Prometheus when compiled in and not disabled by
/// `telemetry.disable_metrics`, otherwise a no-op recorder.
fn build_metrics_recorder(cfg: &ShortlinkConfig) -> Arc<dyn MetricsRecorder> {
    if !cfg.metrics_enabled() {
        info!("metrics disabled via telemetry.disable_metrics");
        return Arc::new(NoopMetricsRecorder);
    }

    #[cfg(feature = "prometheus")]
    {
        match shortlink_telemetry::PrometheusMetricsRecorder::new() {
            Ok(recorder) => return Arc::new(recorder),
            Err(err) => warn!("failed to set up Prometheus metrics, continuing without: {}", err),
        }
    }

    Arc::new(NoopMetricsRecorder)
}

async fn open_store(cfg: &StoreConfig) -> Result<Arc<dyn LinkStore>, ShortlinkError> {
    match cfg.backend {
        StoreBackend::Memory => {
            warn!("using the in-memory store; links are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = cfg.path.as_deref().ok_or_else(|| {
                ShortlinkError::invalid_config(
                    "store.path",
                    "store.path is required for the sqlite backend",
                )
            })?;
            Ok(Arc::new(SqliteStore::open(path).await?))
        }
    }
}

/// Build the service and run the HTTP server on a Tokio runtime until it
/// fails or the process receives Ctrl-C.
fn run_blocking(
    cfg: ShortlinkConfig,
    bind_addr: SocketAddr,
    metrics: Arc<dyn MetricsRecorder>,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let store = open_store(&cfg.store).await?;
        let engine = AllocationEngine::new(store, cfg.service.host()?)
            .with_slug_source(Arc::new(RandomSlugs::new(cfg.slugs.generated_length)))
            .with_max_attempts(cfg.slugs.max_attempts);

        let server = ShortlinkServer::new(
            ServerConfig {
                bind_addr,
                public_origin: cfg.service.origin()?,
            },
            Shortener::new(engine),
            metrics,
        );

        info!("starting shortlink HTTP server on {}", bind_addr);

        tokio::select! {
            res = server.run() => res?,
            _ = tokio::signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Print a concise summary of the loaded configuration.
fn print_config_summary(cfg: &ShortlinkConfig) {
    println!("shortlinkd configuration summary:");
    println!("  service.public_url      = {}", cfg.service.public_url);
    println!("  server.listen_addr      = {}", cfg.server.listen_addr);
    println!("  slugs.generated_length  = {}", cfg.slugs.generated_length);
    println!("  slugs.max_attempts      = {}", cfg.slugs.max_attempts);
    println!(
        "  store.backend           = {}",
        match cfg.store.backend {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite => "sqlite",
        }
    );
    println!(
        "  store.path              = {}",
        cfg.store.path.as_deref().unwrap_or("<not set>")
    );
    println!(
        "  telemetry.log_level     = {}",
        cfg.telemetry
            .as_ref()
            .and_then(|t| t.log_level.as_deref())
            .unwrap_or("<default>")
    );
    println!("  metrics                 = {}", if cfg.metrics_enabled() { "enabled" } else { "disabled" });
}
