//! The handler-facing API surface.
//!
//! Business handlers are plain async functions taking [`ApiContext`] (the
//! per-request context) and, when the route has an input schema, a
//! [`Payload<T>`] (the parsed-and-validated body). Nothing is swallowed on
//! their behalf: every rejection and every returned error propagates to the
//! envelope mapping and the timing wrapper's observation path.

use crate::{error::ApiError, middleware::timing::RequestContext};
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use gatehouse_core::dto::Validate;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Per-request context handed to business handlers: the correlation id
/// plus the request head (method, headers, URL).
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub request_id: Arc<str>,
    pub head: Parts,
}

impl ApiContext {
    /// Shorthand for attaching this request's id to an error.
    #[must_use]
    pub fn error(&self, error: ApiError) -> ApiError {
        error.with_request_id(self.request_id.clone())
    }
}

impl<S> FromRequestParts<S> for ApiContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .ok_or_else(|| ApiError::internal("request context missing; timing layer not mounted"))?;

        Ok(Self { request_id: ctx.request_id.clone(), head: parts.clone() })
    }
}

/// A request body parsed as JSON and checked against its schema.
///
/// Failure mapping is deliberately asymmetric: a body that is not valid
/// JSON surfaces as 500 `INTERNAL`, matching the long-standing behavior of
/// this pipeline (clients never send one through the official frontend),
/// while a well-formed body that fails schema validation is a 400
/// `BAD_REQUEST` with field-level detail.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id =
            req.extensions().get::<RequestContext>().map(|ctx| ctx.request_id.clone());

        let attach_id = |error: ApiError| match &request_id {
            Some(id) => error.with_request_id(id.clone()),
            None => error,
        };

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| attach_id(ApiError::internal(format!("body read failed: {e}"))))?;

        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| attach_id(ApiError::internal(format!("body parse failed: {e}"))))?;

        value.validate().map_err(|issues| attach_id(ApiError::bad_request(issues)))?;

        Ok(Self(value))
    }
}
