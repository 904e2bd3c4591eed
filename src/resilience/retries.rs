//! Retry logic.
//!
//! # Responsibilities
//! - Carry the per-request retry policy (attempts, backoff step, timeout)
//! - Classify each attempt's outcome as retryable or terminal
//!
//! # Design Decisions
//! - Connection errors and timeouts are always retryable; a request that
//!   cannot be built never is
//! - Any 5xx is retryable, 4xx never is
//! - A registry 401 is terminal here; the registry auth handler owns it

use std::time::Duration;

use axum::http::StatusCode;

use crate::config::UpstreamConfig;
use crate::resilience::backoff::linear_backoff;
use crate::routing::ProtocolTag;

/// Retry settings, constant for a request's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Applied to each attempt separately.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Attempts actually made; a zero setting still sends one request.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn delay_before(&self, attempt: u32) -> Duration {
        linear_backoff(attempt, self.base_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UpstreamConfig::default())
    }
}

/// Outcome of one outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Status(StatusCode),
    NetworkError,
    Timeout,
    /// The request could not be built; sending it again cannot help.
    Rejected,
}

/// Ephemeral record of one attempt; only used to decide on a retry.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamAttempt {
    pub number: u32,
    pub outcome: AttemptOutcome,
    pub protocol: ProtocolTag,
}

impl UpstreamAttempt {
    pub fn is_retryable(&self) -> bool {
        match self.outcome {
            AttemptOutcome::NetworkError | AttemptOutcome::Timeout => true,
            AttemptOutcome::Rejected => false,
            AttemptOutcome::Status(status) => status.is_server_error(),
        }
    }

    /// 401 from a registry goes to the token flow instead of the caller.
    pub fn is_auth_challenge(&self) -> bool {
        self.protocol == ProtocolTag::Docker
            && self.outcome == AttemptOutcome::Status(StatusCode::UNAUTHORIZED)
    }

    /// Whether another attempt should follow this one under `policy`.
    pub fn should_retry(&self, policy: &RetryPolicy) -> bool {
        self.number < policy.attempts() && self.is_retryable()
    }

    pub fn label(&self) -> &'static str {
        match self.outcome {
            AttemptOutcome::NetworkError => "network_error",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::Rejected => "invalid_request",
            AttemptOutcome::Status(s) if s.is_server_error() => "server_error",
            AttemptOutcome::Status(_) if self.is_auth_challenge() => "auth_challenge",
            AttemptOutcome::Status(s) if s.is_client_error() => "client_error",
            AttemptOutcome::Status(_) => "success",
        }
    }
}
