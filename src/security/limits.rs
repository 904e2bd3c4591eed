//! Request limits.
//!
//! # Responsibilities
//! - Enforce maximum path length
//! - Enforce the method allow-lists
//!
//! # Design Decisions
//! - Checked before any upstream work (early rejection)
//! - Protocol-tagged requests get the wider method list; Git pushes and
//!   registry uploads need POST/PUT/PATCH
//! - Body size is enforced while buffering, see the dispatcher

use axum::http::Method;

use crate::config::SecurityConfig;
use crate::http::response::GatewayError;
use crate::routing::ProtocolTag;

pub fn validate_path_length(path: &str, config: &SecurityConfig) -> Result<(), GatewayError> {
    if path.len() > config.max_path_length {
        return Err(GatewayError::PathTooLong {
            length: path.len(),
            max: config.max_path_length,
        });
    }
    Ok(())
}

pub fn validate_method(
    method: &Method,
    protocol: ProtocolTag,
    config: &SecurityConfig,
) -> Result<(), GatewayError> {
    let allowed = if protocol.is_protocol() {
        &config.protocol_methods
    } else {
        &config.allowed_methods
    };
    if allowed.iter().any(|m| m.eq_ignore_ascii_case(method.as_str())) {
        Ok(())
    } else {
        Err(GatewayError::MethodNotAllowed(method.clone()))
    }
}
