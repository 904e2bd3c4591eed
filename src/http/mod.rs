//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span)
//!     → dispatcher.rs
//!         → request.rs (normalize path, build RequestContext)
//!         → routing / cache / upstream / registry subsystems
//!         → rewrite.rs (package metadata links)
//!         → response.rs (headers, diagnostics, error mapping)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod request;
pub mod response;
pub mod rewrite;
pub mod server;

pub use dispatcher::Dispatcher;
pub use request::{RequestContext, X_REQUEST_ID};
pub use response::{CacheStatus, GatewayError};
pub use rewrite::ResponseRewriter;
pub use server::HttpServer;
