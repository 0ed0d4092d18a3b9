use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use http::{header, Method};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use shortlink_core::Shortener;
use shortlink_telemetry::MetricsRecorder;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod handlers;

/// Error type for the HTTP server.
///
/// This is intentionally lightweight; callers (typically `shortlinkd`) can
/// map it into their own error types if desired.
#[derive(Debug)]
pub enum ServerError {
    /// Failed to bind on the requested address.
    BindFailed(String),
    /// The HTTP server encountered a runtime error.
    ServeFailed(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::BindFailed(msg) => write!(f, "failed to bind HTTP server: {}", msg),
            ServerError::ServeFailed(msg) => write!(f, "HTTP server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

/// Configuration for the shortlink HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP server on, e.g. `0.0.0.0:8080`.
    pub bind_addr: SocketAddr,

    /// Scheme and host prefixed to every returned short link, without a
    /// trailing slash (e.g. `https://s.example.com`).
    pub public_origin: String,
}

/// TCP peer of the connection a request arrived on.
///
/// Inserted per connection by [`ShortlinkServer::run`]; absent when the
/// router is driven directly (tests).
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub SocketAddr);

/// Shared application state for the HTTP handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) shortener: Shortener,
    pub(crate) metrics: Arc<dyn MetricsRecorder>,
    pub(crate) public_origin: Arc<str>,
}

impl AppState {
    pub(crate) fn new(
        shortener: Shortener,
        metrics: Arc<dyn MetricsRecorder>,
        public_origin: &str,
    ) -> Self {
        Self {
            shortener,
            metrics,
            public_origin: Arc::from(public_origin.trim_end_matches('/')),
        }
    }
}

/// Build the application router.
///
/// - `POST /short`: create or reuse a short link
/// - `POST /query`: read the record behind a slug
/// - `GET /list`: most recent custom slugs
/// - `GET /metrics`: Prometheus exposition, 501 when no exporter is installed
pub(crate) fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/short",
            post(handlers::shorten).fallback(handlers::method_not_allowed),
        )
        .route(
            "/query",
            post(handlers::query).fallback(handlers::method_not_allowed),
        )
        .route(
            "/list",
            get(handlers::list).fallback(handlers::method_not_allowed),
        )
        .route(
            "/metrics",
            get(handlers::metrics).fallback(handlers::method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Handle to a shortlink HTTP server.
///
/// The main entrypoint (`run`) is `async` and will not return until the server
/// stops.
pub struct ShortlinkServer {
    cfg: ServerConfig,
    shortener: Shortener,
    metrics_recorder: Arc<dyn MetricsRecorder>,
}

impl ShortlinkServer {
    pub fn new(
        cfg: ServerConfig,
        shortener: Shortener,
        metrics_recorder: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            cfg,
            shortener,
            metrics_recorder,
        }
    }

    /// Get a shared reference to the underlying metrics recorder.
    pub fn metrics_recorder(&self) -> Arc<dyn MetricsRecorder> {
        Arc::clone(&self.metrics_recorder)
    }

    /// The router this server would serve, without the per-connection peer
    /// address layer.
    pub fn router(&self) -> Router {
        router(AppState::new(
            self.shortener.clone(),
            self.metrics_recorder(),
            &self.cfg.public_origin,
        ))
    }

    /// Run the HTTP server until an accept error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.cfg.bind_addr;

        info!("shortlink-server: binding HTTP server on {}", addr);

        let app = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(e.to_string()))?;

        info!(
            "shortlink-server: listening on {} (public origin {})",
            addr, self.cfg.public_origin
        );

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(s) => s,
                Err(e) => {
                    error!("shortlink-server: accept error: {}", e);
                    return Err(ServerError::ServeFailed(e.to_string()));
                }
            };

            let svc = app.clone().layer(Extension(PeerAddr(peer_addr)));
            let io = TokioIo::new(stream);
            let conn = http1::Builder::new().serve_connection(io, TowerToHyperService::new(svc));

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    error!("shortlink-server: error serving {}: {}", peer_addr, e);
                }
            });
        }
    }
}
