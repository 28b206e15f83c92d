//! The single error envelope every failure surfaces through.
//!
//! Guard rejections, validation failures, and business errors all produce
//! `{ "error": { "code", "message", "details"? }, "requestId" }` with the
//! matching HTTP status, so clients have one shape to handle and one id to
//! quote when correlating with server logs.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gatehouse_core::{
    auth::AuthError,
    dto::FieldIssue,
    error::ErrorCode,
    limiter::RateDecision,
};
use serde_json::json;
use std::sync::Arc;

/// An error ready to leave the process.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<Vec<FieldIssue>>,
    rate: Option<RateDecision>,
    request_id: Option<Arc<str>>,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(issues: Vec<FieldIssue>) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message: "input failed validation".to_string(),
            details: Some(issues),
            rate: None,
            request_id: None,
        }
    }

    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::plain(ErrorCode::Unauthenticated, message)
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::plain(ErrorCode::Forbidden, message)
    }

    #[must_use]
    pub fn rate_limited(decision: RateDecision) -> Self {
        Self {
            code: ErrorCode::RateLimited,
            message: "too many requests".to_string(),
            details: None,
            rate: Some(decision),
            request_id: None,
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::plain(ErrorCode::Internal, message)
    }

    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::plain(ErrorCode::Upstream, message)
    }

    fn plain(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None, rate: None, request_id: None }
    }

    /// Attaches the correlation id this error will be reported under.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Arc<str>) -> Self {
        self.request_id = Some(request_id);
        self
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingScope(_) => Self::forbidden(err.to_string()),
            AuthError::JwksFetch(_) => {
                // A key set we cannot retrieve is our failure, not the
                // client's; do not blame their credentials.
                Self::internal("token verification unavailable")
            }
            _ => Self::unauthenticated(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(details) = &self.details {
            error["details"] = json!(details);
        }

        let body = json!({
            "error": error,
            "requestId": self.request_id.as_deref(),
        });

        let mut response = (self.status(), Json(body)).into_response();

        if let Some(rate) = self.rate {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&rate.retry_after_secs().to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
            if let Ok(value) = HeaderValue::from_str(&rate.remaining.to_string()) {
                headers.insert("x-rate-limit-remaining", value);
            }
            if let Ok(value) = HeaderValue::from_str(&rate.reset_at.to_string()) {
                headers.insert("x-rate-limit-reset", value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn denied_decision() -> RateDecision {
        RateDecision {
            allowed: false,
            remaining: 0,
            reset_after: Duration::from_secs(42),
            reset_at: 1_900_000_000,
            degraded: false,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let err = ApiError::forbidden("cross-origin request rejected")
            .with_request_id(Arc::from("req-123"));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        assert_eq!(body["error"]["message"], "cross-origin request rejected");
        assert_eq!(body["requestId"], "req-123");
    }

    #[tokio::test]
    async fn test_bad_request_carries_field_detail() {
        let err = ApiError::bad_request(vec![FieldIssue::new("seats", "must be at least 1")]);
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["details"][0]["path"], "seats");
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_headers() {
        let response = ApiError::rate_limited(denied_decision()).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");
        assert_eq!(response.headers()["x-rate-limit-remaining"], "0");
        assert_eq!(response.headers()["x-rate-limit-reset"], "1900000000");
    }

    #[tokio::test]
    async fn test_auth_error_mapping() {
        let err: ApiError = AuthError::MissingScope("grades:write".to_string()).into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err: ApiError = AuthError::Expired.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err: ApiError = AuthError::JwksFetch("boom".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_error_does_not_leak_detail_fields() {
        let response = ApiError::internal("response failed contract validation").into_response();
        let body = body_json(response).await;

        assert_eq!(body["error"]["code"], "INTERNAL");
        assert!(body["error"].get("details").is_none());
    }
}
