//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, headers)
//!     → platform.rs (longest-prefix platform lookup)
//!     → classifier.rs (protocol tag)
//!     → Return: Resolution + ProtocolTag, or NoMatch
//!
//! Table Compilation (at startup):
//!     PlatformDefinition[]
//!     → Sort by key length, longest first
//!     → Freeze as immutable PlatformResolver
//! ```
//!
//! # Design Decisions
//! - Table compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same platform
//! - First match wins

pub mod classifier;
pub mod platform;

pub use classifier::{classify, ProtocolTag};
pub use platform::{transform_path, PlatformResolver, Resolution};
