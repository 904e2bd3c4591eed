//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (path length, method allow-list)
//!     → headers.rs (strip hop-by-hop, drop Host before forwarding)
//!     → Pass to the orchestrator
//!
//! Upstream response:
//!     → headers.rs (strip hop-by-hop before returning or caching)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any limit violation
//! - Credentials are forwarded as sent, but never cached

pub mod headers;
pub mod limits;

pub use headers::{forward_request_headers, strip_hop_by_hop};
pub use limits::{validate_method, validate_path_length};
