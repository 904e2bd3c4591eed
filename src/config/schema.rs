//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::config::platforms;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Outbound call settings (timeout, retries, body limits).
    pub upstream: UpstreamConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Request validation limits.
    pub security: SecurityConfig,

    /// Container-registry token flow settings.
    pub registry: RegistryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Platform table: path prefix to upstream mapping.
    #[serde(default = "platforms::builtin_platforms")]
    pub platforms: Vec<PlatformDefinition>,

    /// Hosts rewritten inside response bodies.
    #[serde(default = "platforms::builtin_body_rewrites")]
    pub body_rewrites: Vec<BodyRewriteRule>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            security: SecurityConfig::default(),
            registry: RegistryConfig::default(),
            observability: ObservabilityConfig::default(),
            platforms: platforms::builtin_platforms(),
            body_rewrites: platforms::builtin_body_rewrites(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream call configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,

    /// Total number of attempts for one upstream call.
    pub max_retries: u32,

    /// Linear backoff step in milliseconds.
    pub retry_base_delay_ms: u64,

    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Largest request body buffered for replay.
    pub max_body_bytes: usize,

    /// Largest response body held in memory for rewriting or caching.
    /// Larger responses are streamed through untouched.
    pub max_buffered_response_bytes: usize,

    /// User-Agent sent when the client did not provide one.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            connect_timeout_secs: 10,
            max_body_bytes: 32 * 1024 * 1024,
            max_buffered_response_bytes: 16 * 1024 * 1024,
            user_agent: concat!("devgate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the shared response cache.
    pub enabled: bool,

    /// Time-to-live for cached responses, also advertised via `max-age`.
    pub duration_secs: u64,

    /// Bound on the number of stored responses.
    pub max_entries: Option<usize>,

    /// Bound on the total body bytes held by the store.
    pub max_bytes: Option<usize>,

    /// How often expired entries are swept, in seconds.
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_secs: 1800,
            max_entries: Some(10_000),
            max_bytes: Some(512 * 1024 * 1024),
            purge_interval_secs: 60,
        }
    }
}

/// Request validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Methods accepted for generic requests.
    pub allowed_methods: Vec<String>,

    /// Methods accepted for Git, registry and inference requests.
    pub protocol_methods: Vec<String>,

    /// Longest accepted request path in bytes.
    pub max_path_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_methods: vec!["GET".into(), "HEAD".into()],
            protocol_methods: ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            max_path_length: 2048,
        }
    }
}

/// Container-registry token flow configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum redirect hops followed after a registry response.
    pub max_redirects: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_redirects: 5 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Path transformation applied after the platform prefix is stripped.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewriteKind {
    /// Remaining path is forwarded unchanged.
    #[default]
    None,

    /// Prepend a fixed segment to the remaining path.
    PathPrefix { prefix: String },

    /// Binary file host, kept apart from the metadata upstream.
    PypiFiles,

    /// Search-style paths map onto the upstream's native search endpoint.
    SearchSpecial { prefix: String, search_path: String },

    /// Inject `/<segment>` unless the path starts with a passthrough segment.
    RegistrySpecial {
        #[serde(default = "default_registry_segment")]
        segment: String,
        #[serde(default = "default_registry_passthrough")]
        passthrough: Vec<String>,
    },

    /// Docker Hub official images live under `library/`.
    DockerLibrary,
}

fn default_registry_segment() -> String {
    "current".to_string()
}

fn default_registry_passthrough() -> Vec<String> {
    ["current", "download", "experimental", "stable"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// A configured upstream reachable under `/<key>`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PlatformDefinition {
    /// Path prefix without the leading slash (may contain `/`).
    pub key: String,

    /// Upstream base URL; may carry a path (e.g. `/maven2`).
    pub upstream_base: String,

    /// Path transformation rule.
    #[serde(default)]
    pub rewrite: RewriteKind,
}

impl PlatformDefinition {
    pub fn new(key: impl Into<String>, upstream_base: impl Into<String>, rewrite: RewriteKind) -> Self {
        Self {
            key: key.into(),
            upstream_base: upstream_base.into(),
            rewrite,
        }
    }

    /// The request path prefix this platform answers on.
    pub fn prefix(&self) -> String {
        format!("/{}", self.key)
    }
}

/// Rewrite absolute upstream URLs inside response bodies of `platform`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BodyRewriteRule {
    /// Platform whose responses are rewritten.
    pub platform: String,

    /// Absolute origin to search for (e.g. `https://files.pythonhosted.org`).
    pub upstream_origin: String,

    /// Platform key the origin is replaced with, under this gateway's host.
    pub target_platform: String,
}
