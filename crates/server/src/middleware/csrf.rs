//! Cross-site request forgery checks.
//!
//! Two independent layers, both applied to unsafe methods only:
//!
//! 1. **Origin check**: the `origin` header (or `referer` when `origin` is
//!    absent) must match the service's own configured base origin.
//! 2. **Double-submit check** (optional): the anti-forgery token must
//!    arrive both in a cookie and in the `x-csrf-token` header, byte-equal.
//!    The pipeline never mints this token; it only compares the two copies
//!    the client presents.

use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;
use thiserror::Error;
use url::Url;

/// Header carrying the double-submit token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Why a request failed the CSRF checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsrfRejection {
    #[error("cross-origin request rejected")]
    OriginMismatch,

    #[error("request carries no origin or referer")]
    MissingOrigin,

    #[error("anti-forgery token missing from cookie or header")]
    MissingToken,

    #[error("anti-forgery token mismatch")]
    TokenMismatch,
}

/// Checks that the request originates from `allowed`.
///
/// # Errors
///
/// Returns `CsrfRejection` when neither `origin` nor `referer` matches the
/// allowed origin's scheme/host/port.
pub fn check_same_origin(allowed: &Url, headers: &HeaderMap) -> Result<(), CsrfRejection> {
    let origin = header_str(headers, header::ORIGIN.as_str());
    let referer = header_str(headers, header::REFERER.as_str());

    if origin.is_none() && referer.is_none() {
        return Err(CsrfRejection::MissingOrigin);
    }

    let matches = |value: &str| {
        Url::parse(value).map(|parsed| parsed.origin() == allowed.origin()).unwrap_or(false)
    };

    if origin.is_some_and(matches) || referer.is_some_and(matches) {
        Ok(())
    } else {
        Err(CsrfRejection::OriginMismatch)
    }
}

/// Checks the double-submit pair: cookie `cookie_name` and the
/// `x-csrf-token` header must both be present and byte-equal.
///
/// # Errors
///
/// Returns `CsrfRejection` when either copy is absent or they differ.
pub fn check_double_submit(headers: &HeaderMap, cookie_name: &str) -> Result<(), CsrfRejection> {
    let header_token = header_str(headers, CSRF_HEADER)
        .filter(|t| !t.is_empty())
        .ok_or(CsrfRejection::MissingToken)?;

    let cookie_token = cookie_value(headers, cookie_name)
        .filter(|t| !t.is_empty())
        .ok_or(CsrfRejection::MissingToken)?;

    // Constant-time comparison; the token is still a secret even though we
    // never minted it.
    if header_token.as_bytes().ct_eq(cookie_token.as_bytes()).into() {
        Ok(())
    } else {
        Err(CsrfRejection::TokenMismatch)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = header_str(headers, header::COOKIE.as_str())?;

    cookie::Cookie::split_parse(raw)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn allowed() -> Url {
        Url::parse("https://lms.example.com").unwrap()
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_matching_origin_passes() {
        let map = headers(&[("origin", "https://lms.example.com")]);
        assert!(check_same_origin(&allowed(), &map).is_ok());
    }

    #[test]
    fn test_referer_fallback_passes() {
        let map = headers(&[("referer", "https://lms.example.com/courses/42")]);
        assert!(check_same_origin(&allowed(), &map).is_ok());
    }

    #[test]
    fn test_foreign_origin_rejected() {
        let map = headers(&[("origin", "https://evil.example.net")]);
        assert_eq!(check_same_origin(&allowed(), &map), Err(CsrfRejection::OriginMismatch));
    }

    #[test]
    fn test_missing_both_headers_rejected() {
        let map = HeaderMap::new();
        assert_eq!(check_same_origin(&allowed(), &map), Err(CsrfRejection::MissingOrigin));
    }

    #[test]
    fn test_port_is_part_of_the_origin() {
        let map = headers(&[("origin", "https://lms.example.com:8443")]);
        assert_eq!(check_same_origin(&allowed(), &map), Err(CsrfRejection::OriginMismatch));
    }

    #[test]
    fn test_scheme_is_part_of_the_origin() {
        let map = headers(&[("origin", "http://lms.example.com")]);
        assert_eq!(check_same_origin(&allowed(), &map), Err(CsrfRejection::OriginMismatch));
    }

    #[test]
    fn test_garbage_origin_rejected() {
        let map = headers(&[("origin", "null")]);
        assert_eq!(check_same_origin(&allowed(), &map), Err(CsrfRejection::OriginMismatch));
    }

    #[test]
    fn test_matching_origin_with_foreign_referer_passes() {
        // One matching header is enough.
        let map = headers(&[
            ("origin", "https://lms.example.com"),
            ("referer", "https://evil.example.net/page"),
        ]);
        assert!(check_same_origin(&allowed(), &map).is_ok());
    }

    #[test]
    fn test_double_submit_matching_tokens_pass() {
        let map = headers(&[
            ("cookie", "session=abc; csrf_token=tok-123"),
            ("x-csrf-token", "tok-123"),
        ]);
        assert!(check_double_submit(&map, "csrf_token").is_ok());
    }

    #[test]
    fn test_double_submit_mismatch_rejected() {
        let map = headers(&[("cookie", "csrf_token=tok-123"), ("x-csrf-token", "tok-456")]);
        assert_eq!(check_double_submit(&map, "csrf_token"), Err(CsrfRejection::TokenMismatch));
    }

    #[test]
    fn test_double_submit_missing_cookie_rejected() {
        let map = headers(&[("x-csrf-token", "tok-123")]);
        assert_eq!(check_double_submit(&map, "csrf_token"), Err(CsrfRejection::MissingToken));
    }

    #[test]
    fn test_double_submit_missing_header_rejected() {
        let map = headers(&[("cookie", "csrf_token=tok-123")]);
        assert_eq!(check_double_submit(&map, "csrf_token"), Err(CsrfRejection::MissingToken));
    }

    #[test]
    fn test_double_submit_empty_token_rejected() {
        let map = headers(&[("cookie", "csrf_token="), ("x-csrf-token", "")]);
        assert_eq!(check_double_submit(&map, "csrf_token"), Err(CsrfRejection::MissingToken));
    }

    #[test]
    fn test_double_submit_cookie_name_configurable() {
        let map = headers(&[("cookie", "xsrf=tok-9"), ("x-csrf-token", "tok-9")]);
        assert!(check_double_submit(&map, "xsrf").is_ok());
        assert_eq!(check_double_submit(&map, "csrf_token"), Err(CsrfRejection::MissingToken));
    }
}
