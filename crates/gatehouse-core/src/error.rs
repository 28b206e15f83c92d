//! Stable error codes shared by every layer of the pipeline.
//!
//! Guard rejections, validation failures, and business errors all surface
//! to clients through the same envelope; the code is the machine-readable
//! part of that contract and must stay stable across releases.

use serde::Serialize;

/// Machine-readable error category carried in every error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input failed schema validation; always accompanied by field detail.
    BadRequest,
    /// Missing or unverifiable identity.
    Unauthenticated,
    /// Verified identity lacks a required scope, or a CSRF check failed.
    Forbidden,
    /// A rate limiter denied the request.
    RateLimited,
    /// Malformed request body, an outbound DTO that failed its own
    /// contract, or any uncaught failure.
    Internal,
    /// Propagated from a business handler's upstream dependency; never
    /// generated by the pipeline itself.
    Upstream,
}

impl ErrorCode {
    /// The wire representation used in envelopes and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimited => "RATE_LIMITED",
            Self::Internal => "INTERNAL",
            Self::Upstream => "UPSTREAM",
        }
    }

    /// The HTTP status this code maps to.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::RateLimited => 429,
            Self::Internal => 500,
            Self::Upstream => 502,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_representation_is_stable() {
        assert_eq!(ErrorCode::BadRequest.as_str(), "BAD_REQUEST");
        assert_eq!(ErrorCode::Unauthenticated.as_str(), "UNAUTHENTICATED");
        assert_eq!(ErrorCode::Forbidden.as_str(), "FORBIDDEN");
        assert_eq!(ErrorCode::RateLimited.as_str(), "RATE_LIMITED");
        assert_eq!(ErrorCode::Internal.as_str(), "INTERNAL");
        assert_eq!(ErrorCode::Upstream.as_str(), "UPSTREAM");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::BadRequest.http_status(), 400);
        assert_eq!(ErrorCode::Unauthenticated.http_status(), 401);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
        assert_eq!(ErrorCode::Upstream.http_status(), 502);
    }

    #[test]
    fn test_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::RateLimited).unwrap();
        assert_eq!(json, "\"RATE_LIMITED\"");
    }
}
