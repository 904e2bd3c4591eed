//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Bind → Serve
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → Stop accepting → Finish in-flight requests
//!     → tasks.rs drain (deferred cache writes complete) → Exit
//! ```
//!
//! # Design Decisions
//! - Deferred work is tracked, so it is never cut off by teardown
//! - Ordered shutdown: stop accept, drain requests, drain deferred tasks

pub mod shutdown;
pub mod signals;
pub mod tasks;

pub use shutdown::Shutdown;
pub use signals::{shutdown_signal, spawn_signal_handler};
pub use tasks::DeferredTasks;
