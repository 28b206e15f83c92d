//! The outermost request wrapper.
//!
//! Responsibilities, in order:
//!
//! 1. Reuse the caller's `x-request-id` or mint one, before anything can
//!    fail, so even rejected requests are correlatable.
//! 2. For unsafe methods: CSRF origin check, optional double-submit check,
//!    then the global mutation rate limit keyed by client IP.
//! 3. Run the downstream handler inside a timed scope, feed the metrics
//!    collector, and stamp the correlation header on every response.
//!
//! Guard rejections short-circuit before the handler and are logged as
//! guard rejections; only 5xx responses from downstream count against the
//! route's error metric.

use crate::{
    error::ApiError,
    middleware::csrf::{check_double_submit, check_same_origin},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use uuid::Uuid;

/// The correlation header name, inbound and outbound.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Per-request correlation state, created once per inbound call and carried
/// in request extensions for the lifetime of that call. The raw request
/// itself (method, headers, URL) travels alongside it through the router.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: Arc<str>,
}

impl RequestContext {
    fn from_headers(request: &Request<Body>) -> Self {
        let request_id = request
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| Arc::from(Uuid::new_v4().to_string()), Arc::from);

        Self { request_id }
    }
}

/// Reads the client-supplied idempotency key, if any. Handlers pair this
/// with [`gatehouse_core::idempotency::IdempotencyStore`] to skip
/// re-running retried mutations.
#[must_use]
pub fn idempotency_key(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn is_unsafe_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Rate-limit key for this client: first hop of `x-forwarded-for` when a
/// proxy supplied it, the peer address otherwise.
fn client_key(request: &Request<Body>, addr: SocketAddr) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| addr.ip().to_string(), ToString::to_string)
}

fn route_label(request: &Request<Body>) -> String {
    format!("{} {}", request.method(), request.uri().path())
}

fn stamped(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}

/// The outermost middleware layer; see the module docs for ordering.
pub async fn timing_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = RequestContext::from_headers(&request);
    let request_id = ctx.request_id.clone();
    request.extensions_mut().insert(ctx);

    let route = route_label(&request);

    if is_unsafe_method(request.method()) {
        if let Err(rejection) = check_same_origin(&state.allowed_origin, request.headers()) {
            tracing::warn!(
                request_id = %request_id,
                route = %route,
                reason = %rejection,
                "guard rejected request"
            );
            let error =
                ApiError::forbidden(rejection.to_string()).with_request_id(request_id.clone());
            return stamped(error.into_response(), &request_id);
        }

        if state.config.security.csrf_double_submit {
            if let Err(rejection) =
                check_double_submit(request.headers(), &state.config.security.csrf_cookie)
            {
                tracing::warn!(
                    request_id = %request_id,
                    route = %route,
                    reason = %rejection,
                    "guard rejected request"
                );
                let error =
                    ApiError::forbidden(rejection.to_string()).with_request_id(request_id.clone());
                return stamped(error.into_response(), &request_id);
            }
        }

        let rule = &state.config.security.mutation_limit;
        if rule.enabled {
            let key = format!("mutation:{}", client_key(&request, addr));
            let decision = state.limiter.check(&key, rule.limit, rule.window()).await;

            if !decision.allowed {
                tracing::warn!(
                    request_id = %request_id,
                    route = %route,
                    retry_after_secs = decision.retry_after_secs(),
                    "guard rejected request: mutation rate limit"
                );
                let error = ApiError::rate_limited(decision).with_request_id(request_id.clone());
                return stamped(error.into_response(), &request_id);
            }
        }
    }

    state.metrics.incr_in_flight(&route);
    let started = Instant::now();

    let response = next.run(request).await;

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    state.metrics.decr_in_flight(&route);
    state.metrics.record_timing(&route, elapsed_ms);

    if response.status().is_server_error() {
        state.metrics.record_error(&route);
        tracing::error!(
            request_id = %request_id,
            route = %route,
            status = %response.status(),
            elapsed_ms,
            "request failed"
        );
    }

    stamped(response, &request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_supplied_request_id() {
        let request = Request::builder()
            .uri("/api/x")
            .header("x-request-id", "supplied-id-1")
            .body(Body::empty())
            .unwrap();

        let ctx = RequestContext::from_headers(&request);
        assert_eq!(&*ctx.request_id, "supplied-id-1");
    }

    #[test]
    fn test_mints_uuid_when_absent() {
        let request = Request::builder().uri("/api/x").body(Body::empty()).unwrap();
        let ctx = RequestContext::from_headers(&request);

        assert!(Uuid::parse_str(&ctx.request_id).is_ok());
    }

    #[test]
    fn test_empty_header_is_treated_as_absent() {
        let request = Request::builder()
            .uri("/api/x")
            .header("x-request-id", "")
            .body(Body::empty())
            .unwrap();

        let ctx = RequestContext::from_headers(&request);
        assert!(!ctx.request_id.is_empty());
    }

    #[test]
    fn test_unsafe_method_classification() {
        assert!(is_unsafe_method(&Method::POST));
        assert!(is_unsafe_method(&Method::PUT));
        assert!(is_unsafe_method(&Method::PATCH));
        assert!(is_unsafe_method(&Method::DELETE));
        assert!(!is_unsafe_method(&Method::GET));
        assert!(!is_unsafe_method(&Method::HEAD));
        assert!(!is_unsafe_method(&Method::OPTIONS));
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let addr: SocketAddr = "10.0.0.9:4444".parse().unwrap();
        let request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_key(&request, addr), "203.0.113.7");
    }

    #[test]
    fn test_client_key_falls_back_to_peer() {
        let addr: SocketAddr = "10.0.0.9:4444".parse().unwrap();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        assert_eq!(client_key(&request, addr), "10.0.0.9");
    }

    #[test]
    fn test_route_label_is_method_and_path() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/enroll?course=42")
            .body(Body::empty())
            .unwrap();

        assert_eq!(route_label(&request), "POST /api/enroll");
    }

    #[test]
    fn test_idempotency_key_extraction() {
        let request = Request::builder()
            .uri("/")
            .header("idempotency-key", "retry-7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(idempotency_key(&request), Some("retry-7"));

        let bare = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(idempotency_key(&bare), None);
    }
}
