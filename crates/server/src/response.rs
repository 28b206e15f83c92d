//! Outbound DTO guard.
//!
//! [`JsonDto`] validates a response payload against its own contract before
//! it leaves the process. A failure here is a handler bug, not a client
//! error: the issue paths are logged server-side, and the client receives
//! only a generic internal error so schema internals never leak.

use crate::error::ApiError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gatehouse_core::dto::Validate;
use serde::Serialize;

/// A validated JSON response body.
pub struct JsonDto<T> {
    data: T,
    status: StatusCode,
}

impl<T> JsonDto<T> {
    #[must_use]
    pub fn new(data: T) -> Self {
        Self { data, status: StatusCode::OK }
    }

    #[must_use]
    pub fn with_status(data: T, status: StatusCode) -> Self {
        Self { data, status }
    }
}

impl<T> IntoResponse for JsonDto<T>
where
    T: Serialize + Validate,
{
    fn into_response(self) -> Response {
        if let Err(issues) = self.data.validate() {
            let paths: Vec<&str> = issues.iter().map(|issue| issue.path.as_str()).collect();
            tracing::error!(
                issue_count = issues.len(),
                paths = ?paths,
                "outbound payload failed its own contract"
            );
            return ApiError::internal("response failed contract validation").into_response();
        }

        (self.status, Json(self.data)).into_response()
    }
}
