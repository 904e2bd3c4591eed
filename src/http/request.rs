//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Normalize the request path
//! - Build the immutable per-request context
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The context is built once and never mutated; every later stage reads it

use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use url::Url;

use crate::routing::{ProtocolTag, Resolution};

pub const X_REQUEST_ID: &str = "x-request-id";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Layer that stamps `x-request-id` onto requests that lack one.
pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Collapse runs of `/` and make sure the path starts with one.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    if path.len() > 1 && path.ends_with('/') && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// `scheme://host` this gateway was reached on, as the client sees it.
pub fn gateway_origin(parts: &Parts) -> Option<String> {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))?;
    let scheme = parts
        .headers
        .get(X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| v == "http" || v == "https")
        .or_else(|| parts.uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());
    Some(format!("{scheme}://{host}"))
}

/// Everything derived from one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// `None` when the request carried no usable host.
    pub origin: Option<String>,
    pub resolution: Resolution,
    pub upstream_url: Url,
    pub protocol: ProtocolTag,
}

impl RequestContext {
    pub fn platform_key(&self) -> &str {
        &self.resolution.platform.key
    }

    /// Absolute inbound URL, used as the cache identity.
    pub fn inbound_url(&self) -> Option<Url> {
        let origin = self.origin.as_deref()?;
        let mut raw = format!("{origin}{}", self.path);
        if let Some(q) = self.query.as_deref().filter(|q| !q.is_empty()) {
            raw.push('?');
            raw.push_str(q);
        }
        Url::parse(&raw).ok()
    }
}
