//! Credential-injecting gateway
//!
//! Every request that carries an `Authorization` header (or targets a login
//! path) is forwarded upstream with that header replaced by the next token
//! from the rotation pool. Hop-by-hop headers are stripped in both
//! directions.

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use token_pool::RotationPool;
use tracing::{error, instrument, warn};

use crate::metrics;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state for the gateway listener
#[derive(Clone)]
pub struct GatewayState {
    pub pool: Arc<RotationPool>,
    pub client: reqwest::Client,
    pub upstream_url: String,
    pub timeout: Duration,
    pub login_paths: Arc<[String]>,
    /// Requests forwarded at once; excess requests wait.
    pub max_connections: usize,
}

/// Shared state for the admin listener
#[derive(Clone)]
pub struct AdminState {
    pub pool: Arc<RotationPool>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

/// Gateway router: auth check in front of a catch-all forwarder, under a
/// concurrency limit of `max_connections`.
pub fn build_router(state: GatewayState) -> Router {
    let max_connections = state.max_connections;
    Router::new()
        .fallback(forward_handler)
        .layer(middleware::from_fn_with_state(state.clone(), check_header))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Admin router: `/health` and `/metrics`.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Reject requests without credentials unless they target a login path.
async fn check_header(State(state): State<GatewayState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let is_login = state.login_paths.iter().any(|p| p == path);
    let has_auth = request
        .headers()
        .get(header::AUTHORIZATION)
        .is_some_and(|v| !v.as_bytes().iter().all(u8::is_ascii_whitespace));

    if !is_login && !has_auth {
        metrics::record_rejected("missing_authorization");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"errorMessage":"Missing accessToken."}"#,
        )
            .into_response();
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

async fn forward_handler(State(state): State<GatewayState>, request: Request) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let started = Instant::now();
    let response = forward_request(&state, request, &request_id).await;
    metrics::record_request(response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

/// Forward one request upstream with a pooled credential.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
async fn forward_request(state: &GatewayState, request: Request, request_id: &str) -> Response {
    let Some(token) = state.pool.get_token() else {
        metrics::record_rejected("no_credentials");
        warn!("rotation pool is empty");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no_credentials",
            "no access tokens available",
            request_id,
        );
    };

    let mut bearer = match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
        Ok(v) => v,
        Err(_) => {
            error!("pooled token is not a valid header value");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "proxy_error",
                "pooled token is not a valid header value",
                request_id,
            );
        }
    };
    bearer.set_sensitive(true);

    let upstream_url = match request.uri().path_and_query() {
        Some(pq) => format!("{}{}", state.upstream_url.trim_end_matches('/'), pq),
        None => state.upstream_url.clone(),
    };
    let method = request.method().clone();

    // reqwest sets Host from the upstream URL
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) && name != header::HOST && name != header::AUTHORIZATION {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(header::AUTHORIZATION, bearer);

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("invalid request body: {e}"),
                request_id,
            );
        }
    };

    let upstream_response = match state
        .client
        .request(method, &upstream_url)
        .headers(headers)
        .timeout(state.timeout)
        .body(body)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            error!(error = %e, "upstream timeout");
            return error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "proxy_error",
                &format!("upstream timeout after {}s", state.timeout.as_secs_f64()),
                request_id,
            );
        }
        Err(e) => {
            error!(error = %e, "upstream request failed");
            return error_response(
                StatusCode::BAD_GATEWAY,
                "proxy_error",
                &format!("upstream error: {e}"),
                request_id,
            );
        }
    };

    let status = upstream_response.status();
    let response_headers = upstream_response.headers().clone();
    let response_body = match upstream_response.bytes().await {
        Ok(b) => b,
        Err(e) if e.is_timeout() => {
            error!(error = %e, "upstream timeout while reading body");
            return error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "proxy_error",
                &format!("upstream timeout after {}s", state.timeout.as_secs_f64()),
                request_id,
            );
        }
        Err(e) => {
            error!(error = %e, "failed to read upstream response body");
            return error_response(
                StatusCode::BAD_GATEWAY,
                "proxy_error",
                &format!("upstream response read error: {e}"),
                request_id,
            );
        }
    };

    let mut response = Response::builder().status(status);
    for (name, value) in &response_headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response
        .body(Body::from(response_body))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "proxy_error",
                &format!("response build error: {e}"),
                request_id,
            )
        })
}

/// Pool health plus uptime. 503 while the pool is empty.
async fn health_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let mut body = state.pool.health();
    body["uptime_seconds"] = serde_json::json!(state.started_at.elapsed().as_secs());

    let status = if state.pool.is_empty() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus text exposition format.
async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
