//! Request handlers for the public JSON endpoints.
//!
//! Bodies are read as raw bytes and decoded here rather than through the
//! `Json` extractor so that every rejection carries the `{"Code":0,
//! "Message":...}` envelope clients expect.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use http::{header, HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use shortlink_core::{
    classify, classify_error, Disposition, Origin, Outcome, ShortenRequest, ShortlinkError,
};
use tracing::{debug, error, info, warn};

use crate::{AppState, PeerAddr};

#[derive(Debug, Deserialize)]
struct ShortenBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    overwrite: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Failure<'a> {
    code: u8,
    message: &'a str,
    #[serde(rename = "existingUrl", skip_serializing_if = "Option::is_none")]
    existing_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ShortUrlReply {
    code: u8,
    short_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryReply<'a> {
    code: u8,
    slug: &'a str,
    long_url: &'a str,
    create_time: String,
}

#[derive(Debug, Serialize)]
struct ListEntry<'a> {
    slug: &'a str,
    url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListReply<'a> {
    code: u8,
    data: Vec<ListEntry<'a>>,
}

fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(Failure {
            code: 0,
            message,
            existing_url: None,
        }),
    )
        .into_response()
}

fn status_for(disposition: Disposition) -> StatusCode {
    match disposition {
        Disposition::Accepted => StatusCode::OK,
        Disposition::Conflict => StatusCode::CONFLICT,
        Disposition::Rejected => StatusCode::BAD_REQUEST,
        Disposition::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Disposition::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Provenance of a request: forwarded address, then the `clientIP` header,
/// then the TCP peer.
fn request_origin(headers: &HeaderMap, peer: Option<SocketAddr>) -> Origin {
    let ip = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| header_str(headers, "clientip").map(str::to_string))
        .or_else(|| peer.map(|p| p.ip().to_string()));
    let user_agent = header_str(headers, header::USER_AGENT.as_str()).map(str::to_string);

    Origin::new(ip, user_agent)
}

/// Client-facing message for a failed allocation.
fn error_message(err: &ShortlinkError) -> String {
    match err {
        ShortlinkError::InvalidUrl { .. } => "Invalid URL format".to_string(),
        ShortlinkError::InvalidSlug { .. } => "Invalid slug format".to_string(),
        other => other.to_string(),
    }
}

fn log_failure(err: &ShortlinkError, disposition: Disposition) {
    match disposition {
        Disposition::Rejected | Disposition::Conflict => debug!(kind = err.kind(), "rejected: {}", err),
        Disposition::Unavailable => warn!(kind = err.kind(), "allocation unavailable: {}", err),
        _ => error!(kind = err.kind(), "request failed: {}", err),
    }
}

/// Handler for `POST /short`.
pub(crate) async fn shorten(
    State(state): State<AppState>,
    peer: Option<Extension<PeerAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return failure(StatusCode::BAD_REQUEST, "Unsupported Content-Type");
    }

    let body: ShortenBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            debug!("rejecting /short body: {}", e);
            return failure(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let url = match body.url {
        Some(url) if !url.is_empty() => url,
        _ => return failure(StatusCode::BAD_REQUEST, "URL is required"),
    };

    let origin = request_origin(&headers, peer.map(|Extension(PeerAddr(addr))| addr));
    let mut req = ShortenRequest::new(url)
        .with_overwrite(body.overwrite.unwrap_or(false))
        .with_origin(origin);
    if let Some(slug) = body.slug {
        req = req.with_slug(slug);
    }

    let started = Instant::now();
    let result = state.shortener.shorten(req).await;
    let elapsed = started.elapsed().as_secs_f64();

    let disposition = classify(&result);
    let status = status_for(disposition);

    match result {
        Ok(outcome) => {
            state.metrics.record_allocation(outcome.label(), Some(elapsed));
            match outcome {
                Outcome::Reused { slug } | Outcome::Overwritten { slug } | Outcome::Created { slug } => {
                    info!(slug = %slug, elapsed_ms = elapsed * 1000.0, "short link ready");
                    (
                        status,
                        Json(ShortUrlReply {
                            code: 1,
                            short_url: format!("{}/{}", state.public_origin, slug),
                        }),
                    )
                        .into_response()
                }
                Outcome::Conflict { slug, existing_url } => {
                    debug!(slug = %slug, "slug taken by {}", existing_url);
                    (
                        status,
                        Json(Failure {
                            code: 0,
                            message: "Slug already exists",
                            existing_url: Some(&existing_url),
                        }),
                    )
                        .into_response()
                }
                Outcome::SameDomainRejected => {
                    failure(status, "Cannot shorten a link to the same domain")
                }
            }
        }
        Err(err) => {
            state.metrics.record_error(err.kind());
            log_failure(&err, disposition);
            failure(status, &error_message(&err))
        }
    }
}

/// Handler for `POST /query`.
pub(crate) async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return failure(
            StatusCode::BAD_REQUEST,
            "Unsupported Content-Type. Please use application/json",
        );
    }
    if body.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Empty Request Body");
    }

    let body: QueryBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            debug!("rejecting /query body: {}", e);
            return failure(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let slug = match body.slug {
        Some(slug) if !slug.is_empty() => slug,
        _ => return failure(StatusCode::BAD_REQUEST, "Slug is required"),
    };

    match state.shortener.lookup(&slug).await {
        Ok(Some(record)) => {
            state.metrics.record_lookup(true);
            Json(QueryReply {
                code: 1,
                slug: record.slug.as_str(),
                long_url: &record.url,
                create_time: record.created_at.to_rfc3339(),
            })
            .into_response()
        }
        Ok(None) => {
            state.metrics.record_lookup(false);
            failure(StatusCode::NOT_FOUND, "Slug not found")
        }
        Err(err) => {
            state.metrics.record_error(err.kind());
            let disposition = classify_error(&err);
            log_failure(&err, disposition);
            failure(status_for(disposition), &err.to_string())
        }
    }
}

/// Handler for `GET /list`.
pub(crate) async fn list(State(state): State<AppState>) -> Response {
    match state.shortener.recent_custom().await {
        Ok(records) => Json(ListReply {
            code: 1,
            data: records
                .iter()
                .map(|r| ListEntry {
                    slug: r.slug.as_str(),
                    url: &r.url,
                })
                .collect(),
        })
        .into_response(),
        Err(err) => {
            state.metrics.record_error(err.kind());
            let disposition = classify_error(&err);
            log_failure(&err, disposition);
            failure(status_for(disposition), &err.to_string())
        }
    }
}

/// Handler for `GET /metrics`.
///
/// Returns the recorder's exposition payload, or 501 when the installed
/// recorder has nothing to export.
pub(crate) async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.export() {
        Some(export) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, export.content_type)],
            export.body,
        )
            .into_response(),
        None => (
            StatusCode::NOT_IMPLEMENTED,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Bytes::from_static(b"Prometheus metrics not enabled\n"),
        )
            .into_response(),
    }
}

/// Fallback for known paths hit with an unsupported method.
pub(crate) async fn method_not_allowed() -> Response {
    failure(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::Router;
    use http::Request;
    use serde_json::{json, Value};
    use shortlink_core::{AllocationEngine, MemoryStore, Shortener};
    use shortlink_telemetry::{MetricsRecorder, NoopMetricsRecorder};
    use tower::util::ServiceExt; // for `oneshot`

    use crate::{router, AppState};

    fn state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        let shortener = Shortener::new(AllocationEngine::new(store, "s.example.com"));
        let metrics: Arc<dyn MetricsRecorder> = Arc::new(NoopMetricsRecorder);
        AppState::new(shortener, metrics, "https://s.example.com/")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (http::StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn shorten_creates_then_reuses() {
        let state = state();

        let (status, first) = send(
            router(state.clone()),
            post_json("/short", json!({"url": "https://example.com/page"})),
        )
        .await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(first["Code"], 1);
        let short_url = first["ShortUrl"].as_str().unwrap();
        assert!(short_url.starts_with("https://s.example.com/"));
        assert_eq!(short_url.len(), "https://s.example.com/".len() + 4);

        let (status, second) = send(
            router(state),
            post_json("/short", json!({"url": "https://EXAMPLE.com/page"})),
        )
        .await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(second["ShortUrl"], first["ShortUrl"]);
    }

    #[tokio::test]
    async fn taken_slug_is_a_conflict_with_existing_url() {
        let state = state();
        send(
            router(state.clone()),
            post_json("/short", json!({"url": "https://one.example/", "slug": "docs"})),
        )
        .await;

        let (status, body) = send(
            router(state.clone()),
            post_json("/short", json!({"url": "https://two.example/", "slug": "docs"})),
        )
        .await;
        assert_eq!(status, http::StatusCode::CONFLICT);
        assert_eq!(
            body,
            json!({"Code": 0, "Message": "Slug already exists", "existingUrl": "https://one.example/"})
        );

        let (status, body) = send(
            router(state),
            post_json(
                "/short",
                json!({"url": "https://two.example/", "slug": "docs", "overwrite": true}),
            ),
        )
        .await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(body["ShortUrl"], "https://s.example.com/docs");
    }

    #[tokio::test]
    async fn shorten_rejections() {
        let cases = [
            (json!({"slug": "abc"}), "URL is required"),
            (json!({"url": ""}), "URL is required"),
            (json!({"url": "ftp://example.com"}), "Invalid URL format"),
            (json!({"url": "https://example.com", "slug": "a"}), "Invalid slug format"),
            (json!({"url": "https://example.com", "slug": "ab.png"}), "Invalid slug format"),
            (
                json!({"url": "https://s.example.com/loop"}),
                "Cannot shorten a link to the same domain",
            ),
        ];

        for (body, message) in cases {
            let (status, reply) = send(router(state()), post_json("/short", body.clone())).await;
            assert_eq!(status, http::StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(reply["Code"], 0);
            assert_eq!(reply["Message"], message, "{}", body);
        }
    }

    #[tokio::test]
    async fn shorten_requires_json() {
        let req = Request::builder()
            .method("POST")
            .uri("/short")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("longUrl=aHR0cHM6Ly9leGFtcGxlLmNvbQ=="))
            .unwrap();
        let (status, body) = send(router(state()), req).await;
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["Message"], "Unsupported Content-Type");

        let req = Request::builder()
            .method("POST")
            .uri("/short")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(router(state()), req).await;
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["Message"], "Invalid JSON");
    }

    #[tokio::test]
    async fn provenance_comes_from_forwarding_headers() {
        let state = state();
        let req = Request::builder()
            .method("POST")
            .uri("/short")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "198.51.100.7, 10.0.0.1")
            .header("user-agent", "shortlink-test/1.0")
            .body(Body::from(
                json!({"url": "https://example.com/", "slug": "mine"}).to_string(),
            ))
            .unwrap();
        let (status, _) = send(router(state.clone()), req).await;
        assert_eq!(status, http::StatusCode::OK);

        let record = state.shortener.lookup("mine").await.unwrap().unwrap();
        assert_eq!(record.origin.ip.as_deref(), Some("198.51.100.7"));
        assert_eq!(record.origin.user_agent.as_deref(), Some("shortlink-test/1.0"));
    }

    #[tokio::test]
    async fn query_reports_record_or_not_found() {
        let state = state();
        send(
            router(state.clone()),
            post_json("/short", json!({"url": "https://example.com/q", "slug": "qq"})),
        )
        .await;

        let (status, body) = send(router(state.clone()), post_json("/query", json!({"slug": "qq"}))).await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(body["Code"], 1);
        assert_eq!(body["Slug"], "qq");
        assert_eq!(body["LongUrl"], "https://example.com/q");
        assert!(body["CreateTime"].is_string());

        let (status, body) = send(router(state.clone()), post_json("/query", json!({"slug": "zz"}))).await;
        assert_eq!(status, http::StatusCode::NOT_FOUND);
        assert_eq!(body["Message"], "Slug not found");

        let (status, body) = send(router(state.clone()), post_json("/query", json!({}))).await;
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["Message"], "Slug is required");

        let req = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router(state), req).await;
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["Message"], "Empty Request Body");
    }

    #[tokio::test]
    async fn list_shows_custom_slugs_newest_first() {
        let state = state();
        for body in [
            json!({"url": "https://example.com/1", "slug": "first"}),
            json!({"url": "https://example.com/2"}),
            json!({"url": "https://example.com/3", "slug": "second"}),
        ] {
            send(router(state.clone()), post_json("/short", body)).await;
        }

        let req = Request::builder().uri("/list").body(Body::empty()).unwrap();
        let (status, body) = send(router(state), req).await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(
            body,
            json!({"Code": 1, "Data": [
                {"slug": "second", "url": "https://example.com/3"},
                {"slug": "first", "url": "https://example.com/1"},
            ]})
        );
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let req = Request::builder().uri("/short").body(Body::empty()).unwrap();
        let (status, body) = send(router(state()), req).await;
        assert_eq!(status, http::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["Message"], "Method Not Allowed");

        let req = Request::builder()
            .method("POST")
            .uri("/list")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(router(state()), req).await;
        assert_eq!(status, http::StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn wrong_method_on_metrics_uses_json_envelope() {
        let req = Request::builder()
            .method("POST")
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router(state()), req).await;
        assert_eq!(status, http::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({"Code": 0, "Message": "Method Not Allowed"}));
    }

    #[tokio::test]
    async fn preflight_allows_any_origin() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/short")
            .header("origin", "https://app.example")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let response = router(state()).oneshot(req).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[tokio::test]
    async fn metrics_not_implemented_without_exporter() {
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = router(state()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let req = Request::builder().uri("/unknown").body(Body::empty()).unwrap();
        let response = router(state()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }
}
