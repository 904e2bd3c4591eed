//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Eligible request (policy.rs: GET + generic + no Authorization)
//!     → key.rs (method + absolute URL, optional Range)
//!     → manager.rs check → store.rs lookup
//!         hit: cached body, or range.rs slice / 416
//!         miss: go upstream
//! Upstream response (200, or 206 for ranged requests)
//!     → manager.rs schedule_store → DeferredTasks → store.rs
//! ```
//!
//! # Design Decisions
//! - The store is a trait so the in-process map can be swapped out
//! - A cache failure never fails a request

pub mod key;
pub mod manager;
pub mod policy;
pub mod range;
pub mod store;

pub use key::CacheKey;
pub use manager::{CacheManager, CacheLookup, CachedResponse};
pub use store::{spawn_sweeper, CacheEntry, CacheError, CacheStore, MemoryCacheStore};
