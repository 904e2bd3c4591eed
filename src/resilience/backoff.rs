//! Linear backoff between upstream attempts.

use std::time::Duration;

/// Delay to wait before `attempt` (1-based).
///
/// The first attempt goes out immediately; attempt `n >= 2` waits
/// `base * (n - 1)`. No jitter, no exponential growth.
pub fn linear_backoff(attempt: u32, base: Duration) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    base.saturating_mul(attempt - 1)
}
