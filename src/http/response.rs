//! Response construction and error mapping.
//!
//! # Responsibilities
//! - Map every terminal failure onto one structured JSON error
//! - Build client responses from streamed, buffered or cached parts
//! - Attach diagnostic headers to generic responses
//!
//! # Design Decisions
//! - Error bodies are never cacheable (`private, no-store`)
//! - Protocol-tagged responses get no diagnostic headers

use std::fmt;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::cache::policy::PRIVATE_NO_STORE;
use crate::http::request::X_REQUEST_ID;
use crate::registry::AuthFlowError;
use crate::upstream::UpstreamError;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// Terminal failures, each with a fixed status and code.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("method {0} is not allowed")]
    MethodNotAllowed(Method),

    #[error("path length {length} exceeds the limit of {max}")]
    PathTooLong { length: usize, max: usize },

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("no platform is configured for {0}")]
    NoPlatform(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("upstream responded with {0}")]
    UpstreamStatus(StatusCode),

    #[error("registry redirect chain exceeded {0} hops")]
    RedirectLimit(usize),

    #[error("cannot build upstream request: {0}")]
    InvalidUpstream(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::PathTooLong { .. } => StatusCode::URI_TOO_LONG,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::NoPlatform(_) => StatusCode::NOT_FOUND,
            GatewayError::UpstreamUnavailable(_)
            | GatewayError::UpstreamStatus(_)
            | GatewayError::RedirectLimit(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::InvalidUpstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            GatewayError::PathTooLong { .. } => "PATH_TOO_LONG",
            GatewayError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            GatewayError::NoPlatform(_) => "NOT_FOUND",
            GatewayError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            GatewayError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            GatewayError::UpstreamStatus(_) => "UPSTREAM_ERROR",
            GatewayError::RedirectLimit(_) => "REGISTRY_REDIRECT_LIMIT",
            GatewayError::InvalidUpstream(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::InvalidRequest(msg) => GatewayError::InvalidUpstream(msg),
            err if err.is_timeout() => GatewayError::UpstreamTimeout(err.to_string()),
            err => GatewayError::UpstreamUnavailable(err.to_string()),
        }
    }
}

impl From<AuthFlowError> for GatewayError {
    fn from(err: AuthFlowError) -> Self {
        match err {
            AuthFlowError::TooManyRedirects(max) => GatewayError::RedirectLimit(max),
            AuthFlowError::Upstream(err) => err.into(),
            other => GatewayError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "status": status.as_u16(),
            }
        });
        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static(PRIVATE_NO_STORE));
        response
    }
}

/// Where a generic response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assemble a response from buffered or streamed parts.
pub fn build_response(status: StatusCode, headers: HeaderMap, body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// `X-Request-Id`, `X-Cache` and `Server-Timing` for generic responses.
pub fn apply_diagnostics(
    headers: &mut HeaderMap,
    request_id: &str,
    cache: CacheStatus,
    start: Instant,
) {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, v);
    }
    headers.insert(X_CACHE, HeaderValue::from_static(cache.as_str()));
    let timing = format!("total;dur={:.1}", start.elapsed().as_secs_f64() * 1000.0);
    if let Ok(v) = HeaderValue::from_str(&timing) {
        headers.insert(SERVER_TIMING, v);
    }
}
