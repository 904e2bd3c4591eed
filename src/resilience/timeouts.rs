//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap each upstream attempt with its own deadline
//! - Turn an elapsed deadline into a distinct, retryable error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A timeout aborts one attempt only, never the retry sequence

use std::future::Future;
use std::time::Duration;

use crate::upstream::UpstreamError;

/// Run `attempt`, failing with `UpstreamError::Timeout` after `limit`.
pub async fn with_timeout<F, T>(limit: Duration, attempt: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout(limit)),
    }
}
