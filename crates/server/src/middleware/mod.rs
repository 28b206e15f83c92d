//! Axum middleware for the edge pipeline.
//!
//! - [`timing`]: the outermost wrapper: correlation id, CSRF guards,
//!   global mutation rate limit, timed scope and metrics.
//! - [`csrf`]: the pure origin and double-submit checks the wrapper calls.
//! - [`auth`]: bearer token verification applied per secured sub-router.

pub mod auth;
pub mod csrf;
pub mod timing;

pub use auth::{bearer_auth_middleware, ScopePolicy};
pub use timing::{timing_middleware, RequestContext, X_REQUEST_ID};
