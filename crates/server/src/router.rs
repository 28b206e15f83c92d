//! Router assembly and the pipeline's own operational endpoints.
//!
//! Business routers are built elsewhere and passed through
//! [`apply_edge_layers`]; the layer ordering lives here, in one place,
//! so the guard sequence is visible and testable rather than implied by
//! nested wrapping.

use crate::{
    api::ApiContext,
    error::ApiError,
    middleware::{auth::ScopePolicy, bearer_auth_middleware, timing_middleware},
    response::JsonDto,
    state::AppState,
};
use axum::{
    extract::State,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use gatehouse_core::{
    dto::{FieldIssue, Validate},
    metrics::RouteSnapshot,
};
use serde::Serialize;
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;

/// JSON body of `/metrics/summary`.
#[derive(Debug, Serialize)]
pub struct MetricsSummary {
    pub routes: Vec<RouteSnapshot>,
}

impl Validate for MetricsSummary {
    fn validate(&self) -> Result<(), Vec<FieldIssue>> {
        let mut issues = Vec::new();
        for snapshot in &self.routes {
            if snapshot.p50 > snapshot.p95 || snapshot.p95 > snapshot.p99 {
                issues.push(FieldIssue::new(
                    format!("routes.{}", snapshot.route),
                    "percentiles out of order",
                ));
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[allow(clippy::unused_async)]
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render_prometheus()
}

/// Per-route statistics, emitted through the DTO guard like any business
/// response.
#[allow(clippy::unused_async)]
pub async fn handle_metrics_summary(
    State(state): State<AppState>,
    _ctx: ApiContext,
) -> Result<JsonDto<MetricsSummary>, ApiError> {
    Ok(JsonDto::new(MetricsSummary { routes: state.metrics.snapshot() }))
}

/// Wraps `router` in the edge pipeline: body-size limit, then the timing
/// wrapper outermost so every response (including guard rejections) gets a
/// correlation header and a metrics observation.
pub fn apply_edge_layers(router: Router, state: &AppState) -> Router {
    router
        .layer(RequestBodyLimitLayer::new(state.config.server.max_body_bytes))
        .layer(axum_middleware::from_fn_with_state(state.clone(), timing_middleware))
}

/// Applies bearer auth demanding `scopes` to every route in `router`.
pub fn secure(router: Router, state: &AppState, scopes: &[&str]) -> Router {
    router.layer(axum_middleware::from_fn_with_state(
        ScopePolicy::from_state(state, scopes),
        bearer_auth_middleware,
    ))
}

/// The deployable app: operational endpoints behind the full pipeline.
pub fn create_app(state: &AppState) -> Router {
    let ops = Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/metrics/summary", get(handle_metrics_summary))
        .with_state(state.clone());

    apply_edge_layers(ops, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode},
    };
    use gatehouse_core::config::AppConfig;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        AppState::from_config(AppConfig::default()).await.expect("default config must build")
    }

    fn get_request(uri: &str) -> Request<Body> {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        Request::builder()
            .uri(uri)
            .extension(ConnectInfo(addr))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let state = test_state().await;
        let app = create_app(&state);

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_metrics_route_renders_prometheus_text() {
        let state = test_state().await;
        let app = create_app(&state);

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_summary_passes_dto_guard() {
        let state = test_state().await;
        state.metrics.record_timing("GET /health", 12);
        let app = create_app(&state);

        let response = app.oneshot(get_request("/metrics/summary")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["routes"].is_array());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found_with_correlation_header() {
        let state = test_state().await;
        let app = create_app(&state);

        let response = app.oneshot(get_request("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn test_summary_dto_rejects_disordered_percentiles() {
        let summary = MetricsSummary {
            routes: vec![RouteSnapshot {
                route: "GET /x".to_string(),
                count: 1,
                p50: 100,
                p95: 50,
                p99: 200,
                errors: 0,
                in_flight: 0,
            }],
        };

        assert!(summary.validate().is_err());
    }
}
