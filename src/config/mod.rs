//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! No config file:
//!     GatewayConfig::default()
//!     → platforms.rs supplies the built-in platform table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the platform table is injected into
//!   the resolver at construction, never read from module-level state
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod platforms;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, resolve_config, ConfigError};
pub use schema::{
    BodyRewriteRule, CacheConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    PlatformDefinition, RegistryConfig, RewriteKind, SecurityConfig, UpstreamConfig,
};
