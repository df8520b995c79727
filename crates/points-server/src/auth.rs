//! Shared-secret basic authentication.
//!
//! Every request must carry `Authorization: Basic <base64>` whose decoded
//! text equals the configured secret. The check runs as middleware in
//! front of every route, including the not-found fallback, so a rejected
//! request never reaches any state.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Middleware rejecting requests that do not present the secret.
pub async fn require_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if credential_matches(request.headers(), state.secret()) {
        Ok(next.run(request).await)
    } else {
        warn!(
            method = %request.method(),
            uri = %request.uri(),
            "rejected request without valid credential"
        );
        Err(ApiError::Unauthorized)
    }
}

/// Whether `headers` carry a basic-auth credential equal to `secret`.
pub fn credential_matches(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic)
        .is_some_and(|credential| constant_time_eq(credential.as_bytes(), secret.as_bytes()))
}

/// Decode the credential of a `Basic` authorization value.
fn decode_basic(value: &str) -> Option<String> {
    let (scheme, payload) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(value) {
            headers.insert(AUTHORIZATION, v);
        }
        headers
    }

    #[test]
    fn accepts_matching_secret() {
        let encoded = STANDARD.encode("driver:s3cret");
        let headers = headers_with(&format!("Basic {encoded}"));
        assert!(credential_matches(&headers, "driver:s3cret"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let encoded = STANDARD.encode("driver:guess");
        let headers = headers_with(&format!("Basic {encoded}"));
        assert!(!credential_matches(&headers, "driver:s3cret"));
    }

    #[test]
    fn rejects_missing_header() {
        assert!(!credential_matches(&HeaderMap::new(), "anything"));
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        let encoded = STANDARD.encode("driver:s3cret");
        assert!(!credential_matches(&headers_with(&format!("Bearer {encoded}")), "driver:s3cret"));
        assert!(!credential_matches(&headers_with("Basic !!!not-base64"), "driver:s3cret"));
        assert!(!credential_matches(&headers_with("Basic"), "driver:s3cret"));
    }
}
