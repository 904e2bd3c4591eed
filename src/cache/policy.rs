//! Cache eligibility rules.
//!
//! A request is eligible only when it is a GET, classified generic, and
//! carries no `Authorization` header. The last rule is absolute: a
//! credentialed request never reads from or writes to the shared store.

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_ENCODING};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::routing::ProtocolTag;

pub const PRIVATE_NO_STORE: &str = "private, no-store";

pub fn request_eligible(method: &Method, protocol: ProtocolTag, headers: &HeaderMap) -> bool {
    method == Method::GET && protocol == ProtocolTag::Generic && !headers.contains_key(AUTHORIZATION)
}

/// Whether an upstream response may be stored. A full 200 is stored under
/// the plain key even when it answered a ranged request; a 206 only under
/// the range key of the request that asked for it.
pub fn response_storable(status: StatusCode, ranged: bool) -> bool {
    status == StatusCode::OK || (ranged && status == StatusCode::PARTIAL_CONTENT)
}

/// Whether the body is stored as-is. Encoded bodies are never shared, since
/// the next client may not accept that encoding.
pub fn identity_encoded(headers: &HeaderMap) -> bool {
    headers.get_all(CONTENT_ENCODING).iter().all(|v| {
        v.to_str()
            .map(|s| s.split(',').all(|c| c.trim().eq_ignore_ascii_case("identity")))
            .unwrap_or(false)
    })
}

pub fn public_max_age(ttl: Duration) -> HeaderValue {
    HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs()))
        .unwrap_or_else(|_| HeaderValue::from_static(PRIVATE_NO_STORE))
}

/// `Cache-Control` for a response sent to the client.
pub fn cache_control(eligible: bool, status: StatusCode, ttl: Duration) -> HeaderValue {
    if eligible && matches!(status, StatusCode::OK | StatusCode::PARTIAL_CONTENT) {
        public_max_age(ttl)
    } else {
        HeaderValue::from_static(PRIVATE_NO_STORE)
    }
}
