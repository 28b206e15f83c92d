//! Bearer token verification with key-rotation tolerance.
//!
//! # Architecture
//!
//! Verification runs in one of two modes, fixed at startup:
//!
//! - **Production**: asymmetric RS256 against the issuer's published JWKS.
//!   Key sets are cached per issuer URL with a TTL; a verification failure
//!   evicts the cached set and refetches exactly once before giving up,
//!   which absorbs issuer key rotation between cache refreshes.
//! - **Development**: symmetric HS256 with a configured shared secret, for
//!   local work and tests. No network fetch.
//!
//! Mixing the modes is a configuration error caught at startup
//! (`AppConfig::validate`), never a runtime fallback.
//!
//! # Claim checks
//!
//! On top of the signature, every token must satisfy:
//!
//! - `aud` equals the configured audience
//! - the `scope` claim (space-delimited string, or the `scp` array form
//!   some issuers emit) is a superset of the scopes the route demands
//! - `exp` and `iat` hold within the configured clock-skew leeway

pub mod verifier;

pub use verifier::{HttpJwksFetcher, JwksFetcher, TokenVerifier};

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for bearer token verification.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token was presented
    #[error("missing bearer token")]
    MissingToken,

    /// The token could not be parsed or a required claim is absent
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token is signed with an algorithm this deployment rejects
    #[error("token algorithm {0:?} is not accepted")]
    AlgorithmNotAllowed(Algorithm),

    /// No key in the issuer's set matches the token's key id
    #[error("no signing key matches the token key id")]
    UnknownKeyId,

    /// Signature verification failed against every candidate key
    #[error("signature verification failed")]
    InvalidSignature,

    /// The token is outside its validity window even with leeway applied
    #[error("token expired")]
    Expired,

    /// The token claims an issue time in the future beyond the leeway
    #[error("token issued in the future")]
    NotYetValid,

    /// The `aud` claim does not match the expected audience
    #[error("audience mismatch")]
    AudienceMismatch,

    /// The token's scopes do not cover a demanded scope
    #[error("missing required scope: {0}")]
    MissingScope(String),

    /// The JWKS document could not be fetched or contained no usable keys
    #[error("JWKS fetch failed: {0}")]
    JwksFetch(String),
}

/// Claims extracted from a successfully verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// Subject identifier.
    #[serde(default)]
    pub sub: String,

    /// Audience claim, string or array form.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,

    /// Space-delimited scope string (RFC 8693 form).
    #[serde(default)]
    pub scope: Option<String>,

    /// Array-form scope claim some issuers emit instead.
    #[serde(default)]
    pub scp: Option<Vec<String>>,

    /// Issue time, seconds since the Unix epoch.
    #[serde(default)]
    pub iat: Option<i64>,

    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

impl VerifiedClaims {
    /// Every scope the token grants, across both claim forms.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        let mut scopes: Vec<&str> =
            self.scope.as_deref().map(|s| s.split_whitespace().collect()).unwrap_or_default();

        if let Some(scp) = &self.scp {
            scopes.extend(scp.iter().map(String::as_str));
        }

        scopes
    }

    /// Returns the first demanded scope this token does not grant, if any.
    #[must_use]
    pub fn missing_scope(&self, required: &[&str]) -> Option<String> {
        let granted = self.scopes();
        required.iter().find(|scope| !granted.contains(*scope)).map(|s| (*s).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_from_space_delimited_string() {
        let claims = VerifiedClaims {
            sub: "user-1".to_string(),
            aud: None,
            scope: Some("courses:read courses:write".to_string()),
            scp: None,
            iat: None,
            exp: 0,
        };

        assert_eq!(claims.scopes(), vec!["courses:read", "courses:write"]);
        assert!(claims.missing_scope(&["courses:read"]).is_none());
        assert_eq!(claims.missing_scope(&["grades:write"]), Some("grades:write".to_string()));
    }

    #[test]
    fn test_scopes_from_array_form() {
        let claims = VerifiedClaims {
            sub: "user-1".to_string(),
            aud: None,
            scope: None,
            scp: Some(vec!["quizzes:submit".to_string()]),
            iat: None,
            exp: 0,
        };

        assert!(claims.missing_scope(&["quizzes:submit"]).is_none());
    }

    #[test]
    fn test_both_claim_forms_merge() {
        let claims = VerifiedClaims {
            sub: "user-1".to_string(),
            aud: None,
            scope: Some("a".to_string()),
            scp: Some(vec!["b".to_string()]),
            iat: None,
            exp: 0,
        };

        assert!(claims.missing_scope(&["a", "b"]).is_none());
    }

    #[test]
    fn test_no_scopes_at_all() {
        let claims = VerifiedClaims {
            sub: "user-1".to_string(),
            aud: None,
            scope: None,
            scp: None,
            iat: None,
            exp: 0,
        };

        assert!(claims.scopes().is_empty());
        assert!(claims.missing_scope(&[]).is_none());
        assert!(claims.missing_scope(&["anything"]).is_some());
    }
}
