//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (body rewrites reference existing platforms)
//! - Validate value ranges (timeouts > 0, retries > 0)
//! - Detect conflicting platform keys
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("platform key must not be empty")]
    EmptyPlatformKey,

    #[error("platform key '{0}' must not start or end with '/'")]
    PlatformKeySlash(String),

    #[error("platform key '{0}' is defined more than once")]
    DuplicatePlatform(String),

    #[error("platform '{key}' has invalid upstream_base '{base}'")]
    UpstreamBase { key: String, base: String },

    #[error("body rewrite references unknown platform '{0}'")]
    UnknownRewritePlatform(String),

    #[error("'{0}' is not a valid HTTP method")]
    Method(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.timeout_secs"));
    }
    if config.upstream.max_retries == 0 {
        errors.push(ValidationError::Zero("upstream.max_retries"));
    }
    if config.upstream.max_buffered_response_bytes == 0 {
        errors.push(ValidationError::Zero("upstream.max_buffered_response_bytes"));
    }
    if config.cache.enabled && config.cache.duration_secs == 0 {
        errors.push(ValidationError::Zero("cache.duration_secs"));
    }
    if config.cache.enabled && config.cache.purge_interval_secs == 0 {
        errors.push(ValidationError::Zero("cache.purge_interval_secs"));
    }
    if config.security.max_path_length == 0 {
        errors.push(ValidationError::Zero("security.max_path_length"));
    }

    let mut seen = HashSet::new();
    for platform in &config.platforms {
        if platform.key.is_empty() {
            errors.push(ValidationError::EmptyPlatformKey);
            continue;
        }
        if platform.key.starts_with('/') || platform.key.ends_with('/') {
            errors.push(ValidationError::PlatformKeySlash(platform.key.clone()));
        }
        if !seen.insert(platform.key.as_str()) {
            errors.push(ValidationError::DuplicatePlatform(platform.key.clone()));
        }
        let base_ok = Url::parse(&platform.upstream_base)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
            .unwrap_or(false);
        if !base_ok {
            errors.push(ValidationError::UpstreamBase {
                key: platform.key.clone(),
                base: platform.upstream_base.clone(),
            });
        }
    }

    for rule in &config.body_rewrites {
        for key in [&rule.platform, &rule.target_platform] {
            if !seen.contains(key.as_str()) {
                errors.push(ValidationError::UnknownRewritePlatform(key.clone()));
            }
        }
    }

    for method in config
        .security
        .allowed_methods
        .iter()
        .chain(config.security.protocol_methods.iter())
    {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::Method(method.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
