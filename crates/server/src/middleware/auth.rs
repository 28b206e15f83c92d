//! Bearer token middleware.
//!
//! Extracts `authorization: Bearer <jwt>`, verifies it with the configured
//! [`TokenVerifier`], and inserts the resulting [`VerifiedClaims`] into
//! request extensions for downstream handlers. The scopes a route demands
//! are fixed when the layer is built.

use crate::{error::ApiError, middleware::timing::RequestContext, state::AppState};
use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use gatehouse_core::auth::{AuthError, TokenVerifier, VerifiedClaims};
use std::sync::Arc;

/// State for one secured sub-router: the verifier plus the scopes every
/// route behind it demands.
#[derive(Clone)]
pub struct ScopePolicy {
    pub verifier: Arc<TokenVerifier>,
    pub required: Arc<[String]>,
}

impl ScopePolicy {
    #[must_use]
    pub fn new(verifier: Arc<TokenVerifier>, required: &[&str]) -> Self {
        Self { verifier, required: required.iter().map(ToString::to_string).collect() }
    }

    /// Policy using the application's configured verifier.
    #[must_use]
    pub fn from_state(state: &AppState, required: &[&str]) -> Self {
        Self::new(state.verifier.clone(), required)
    }
}

fn bearer_token(request: &Request<Body>) -> Result<&str, AuthError> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Axum middleware enforcing the policy's scopes.
///
/// # Errors
///
/// Returns 401 for a missing or unverifiable token, 403 when the verified
/// token lacks a demanded scope.
pub async fn bearer_auth_middleware(
    State(policy): State<ScopePolicy>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id =
        request.extensions().get::<RequestContext>().map(|ctx| ctx.request_id.clone());

    let attach_id = |error: ApiError| match &request_id {
        Some(id) => error.with_request_id(id.clone()),
        None => error,
    };

    let token = bearer_token(&request).map_err(|e| attach_id(e.into()))?;

    let required: Vec<&str> = policy.required.iter().map(String::as_str).collect();
    let claims: VerifiedClaims = policy.verifier.verify(token, &required).await.map_err(|e| {
        tracing::warn!(error = %e, "bearer token rejected");
        attach_id(e.into())
    })?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
