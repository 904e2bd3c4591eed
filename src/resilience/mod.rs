//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (enforce per-attempt deadline)
//!     → retries.rs (classify the attempt, decide on another one)
//!     → backoff.rs (linear delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries are bounded by a total attempt count
//! - Backoff is linear and deterministic

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::linear_backoff;
pub use retries::{AttemptOutcome, RetryPolicy, UpstreamAttempt};
pub use timeouts::with_timeout;
