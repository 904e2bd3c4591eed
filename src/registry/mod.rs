//! Container-registry subsystem.
//!
//! # Data Flow
//! ```text
//! Docker-tagged request
//!     → auth.rs (unauthenticated attempt through the orchestrator)
//!     → 401? challenge.rs (parse Bearer challenge, build token URL)
//!     → auth.rs (token fetch, authorized retry, manual redirects)
//!     → final response back to the dispatcher
//! ```

pub mod auth;
pub mod challenge;

pub use auth::{AuthFlowError, AuthState, RegistryAuthHandler};
pub use challenge::{scope_from_path, BearerChallenge};
