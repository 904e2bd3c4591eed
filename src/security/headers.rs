//! Header hygiene for forwarded requests and returned responses.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Prepare the header set sent upstream
//!
//! # Design Decisions
//! - Names listed in `Connection` are treated as hop-by-hop as well
//! - `Host` is always recomputed by the outbound client

use axum::http::header::{
    HeaderName, ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, HOST, PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::HeaderMap;

const KEEP_ALIVE: &str = "keep-alive";
const PROXY_CONNECTION: &str = "proxy-connection";

/// Remove connection-scoped headers.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in [
        CONNECTION,
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ] {
        headers.remove(name);
    }
    headers.remove(KEEP_ALIVE);
    headers.remove(PROXY_CONNECTION);
}

/// Header set for the outbound request.
///
/// `identity_only` asks the upstream for an uncompressed body so it can be
/// rewritten as text.
pub fn forward_request_headers(inbound: &HeaderMap, identity_only: bool) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    if identity_only {
        headers.remove(ACCEPT_ENCODING);
    }
    headers
}
