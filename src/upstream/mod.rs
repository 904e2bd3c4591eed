//! Upstream access subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher / registry auth handler
//!     → orchestrator.rs (attempt loop: timeout, retry, backoff)
//!     → client.rs (UpstreamClient: one call, streamed body, no auto-redirects)
//!     → upstream host
//! ```

pub mod client;
pub mod orchestrator;

pub use client::{
    Buffered, ByteStream, ReqwestUpstream, UpstreamBody, UpstreamClient, UpstreamError, UpstreamRequest,
    UpstreamResponse,
};
pub use orchestrator::Orchestrator;
