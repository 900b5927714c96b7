//! Bearer-token authentication for `/query` and HMAC-SHA256 signature
//! verification for `/slack/command`, per the component design's signing
//! scheme: `"v0=" + HMAC-SHA256(secret, "v0:{timestamp}:{rawBody}")`.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::ApiError;

/// Signed requests older or newer than this many seconds are rejected.
const REPLAY_WINDOW_SECS: i64 = 300;

/// Checks the `Authorization: Bearer <token>` header against `expected`
/// using a constant-time comparison. When `expected` is `None`, the
/// deployment has no bearer token configured and every request is rejected
/// (an unconfigured secret is not an open door).
pub fn verify_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let expected = expected.ok_or_else(|| ApiError::Unauthorized("bearer authentication is not configured".to_string()))?;
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Authorization header must use the Bearer scheme".to_string()))?;

    if constant_time_eq_str(token, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid bearer token".to_string()))
    }
}

/// Verifies a chat-platform signature header pair against the raw request
/// body, including the replay-window check on the timestamp header.
///
/// # Errors
/// Returns [`ApiError::Unauthorized`] when the timestamp is missing,
/// malformed, outside the replay window, or the signature does not match.
pub fn verify_chat_signature(secret: &str, headers: &HeaderMap, raw_body: &[u8], now_epoch_secs: i64) -> Result<(), ApiError> {
    let timestamp_header = header_str(headers, "x-request-timestamp").ok_or_else(|| ApiError::Unauthorized("missing X-Request-Timestamp header".to_string()))?;
    let timestamp: i64 = timestamp_header
        .parse()
        .map_err(|_| ApiError::Unauthorized("X-Request-Timestamp is not a valid integer".to_string()))?;

    if (now_epoch_secs - timestamp).abs() > REPLAY_WINDOW_SECS {
        return Err(ApiError::Unauthorized("request timestamp outside the replay window".to_string()));
    }

    let signature_header = header_str(headers, "x-signature").ok_or_else(|| ApiError::Unauthorized("missing X-Signature header".to_string()))?;

    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()).map_err(|_| ApiError::Internal("invalid signing secret length".to_string()))?;
    mac.update(b"v0:");
    mac.update(timestamp_header.as_bytes());
    mac.update(b":");
    mac.update(raw_body);
    let computed = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

    if constant_time_eq_str(&computed, signature_header) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("signature mismatch".to_string()))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn constant_time_eq_str(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(), HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn bearer_matches_expected_token() {
        let headers = headers_with(&[("authorization", "Bearer secret-token")]);
        assert!(verify_bearer(&headers, Some("secret-token")).is_ok());
    }

    #[test]
    fn bearer_rejects_wrong_token() {
        let headers = headers_with(&[("authorization", "Bearer wrong")]);
        assert!(verify_bearer(&headers, Some("secret-token")).is_err());
    }

    #[test]
    fn bearer_rejects_when_unconfigured() {
        let headers = headers_with(&[("authorization", "Bearer anything")]);
        assert!(verify_bearer(&headers, None).is_err());
    }

    fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(b"v0:");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn chat_signature_round_trips() {
        let body = b"text=hello";
        let signature = sign("shh", "1000", body);
        let headers = headers_with(&[("x-request-timestamp", "1000"), ("x-signature", &signature)]);
        assert!(verify_chat_signature("shh", &headers, body, 1000).is_ok());
    }

    #[test]
    fn chat_signature_rejects_stale_timestamp() {
        let body = b"text=hello";
        let signature = sign("shh", "1000", body);
        let headers = headers_with(&[("x-request-timestamp", "1000"), ("x-signature", &signature)]);
        assert!(verify_chat_signature("shh", &headers, body, 1000 + 301).is_err());
    }

    #[test]
    fn chat_signature_rejects_tampered_body() {
        let body = b"text=hello";
        let signature = sign("shh", "1000", body);
        let headers = headers_with(&[("x-request-timestamp", "1000"), ("x-signature", &signature)]);
        assert!(verify_chat_signature("shh", &headers, b"text=goodbye", 1000).is_err());
    }
}
