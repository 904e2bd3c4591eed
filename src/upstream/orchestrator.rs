//! Upstream call orchestration: timeout, retry, linear backoff.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::observability::metrics;
use crate::resilience::{with_timeout, AttemptOutcome, RetryPolicy, UpstreamAttempt};
use crate::routing::ProtocolTag;
use crate::upstream::client::{UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};

/// Issues outbound calls with per-attempt timeouts and bounded retries.
///
/// Every other component reaches upstreams through here. It holds no
/// per-request state; the same instance serves all requests.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn UpstreamClient>,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn UpstreamClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call the upstream until a terminal outcome or the attempt budget runs out.
    ///
    /// A persistent 5xx is returned as the last observed response; persistent
    /// network errors or timeouts come back as `UpstreamError::Exhausted`.
    pub async fn call(
        &self,
        request: &UpstreamRequest,
        protocol: ProtocolTag,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut number = 0;

        loop {
            number += 1;

            let delay = self.policy.delay_before(number);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let result = with_timeout(self.policy.timeout, self.client.send(request.clone())).await;
            let outcome = match &result {
                Ok(response) => AttemptOutcome::Status(response.status),
                Err(UpstreamError::Timeout(_)) => AttemptOutcome::Timeout,
                Err(UpstreamError::InvalidRequest(_)) => AttemptOutcome::Rejected,
                Err(_) => AttemptOutcome::NetworkError,
            };
            let attempt = UpstreamAttempt {
                number,
                outcome,
                protocol,
            };
            metrics::record_upstream_attempt(attempt.label());

            if attempt.should_retry(&self.policy) {
                info!(
                    url = %request.url,
                    attempt = number,
                    outcome = attempt.label(),
                    delay = ?self.policy.delay_before(number + 1),
                    "Retrying upstream request"
                );
                continue;
            }

            return match result {
                Ok(response) => {
                    if attempt.is_auth_challenge() {
                        debug!(url = %request.url, "Registry challenge, handing to token flow");
                    } else if response.status.is_server_error() {
                        warn!(
                            url = %request.url,
                            attempts = number,
                            status = %response.status,
                            "Upstream kept failing"
                        );
                    }
                    Ok(response)
                }
                Err(UpstreamError::InvalidRequest(msg)) => Err(UpstreamError::InvalidRequest(msg)),
                Err(err) => {
                    warn!(url = %request.url, attempts = number, error = %err, "Upstream request failed");
                    Err(UpstreamError::Exhausted {
                        attempts: number,
                        last: Box::new(err),
                    })
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::client::UpstreamBody;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, StatusCode};
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    /// Replays a fixed list of results, repeating the last one.
    struct Sequence {
        results: Vec<Result<StatusCode, UpstreamError>>,
        calls: Mutex<Vec<tokio::time::Instant>>,
    }

    impl Sequence {
        fn new(results: Vec<Result<StatusCode, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                results,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<tokio::time::Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpstreamClient for Sequence {
        async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(tokio::time::Instant::now());
                calls.len() - 1
            };
            let result = self.results[index.min(self.results.len() - 1)].clone();
            result.map(|status| UpstreamResponse {
                status,
                headers: HeaderMap::new(),
                body: UpstreamBody::empty(),
                url: request.url,
            })
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest::get(Url::parse("https://upstream.example/file").unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_5xx_uses_every_attempt_with_linear_delays() {
        let upstream = Sequence::new(vec![Ok(StatusCode::SERVICE_UNAVAILABLE)]);
        let orchestrator = Orchestrator::new(upstream.clone(), policy(4));

        let response = orchestrator.call(&request(), ProtocolTag::Generic).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

        let times = upstream.call_times();
        assert_eq!(times.len(), 4);
        let gaps: Vec<_> = times.windows(2).map(|w| w[1] - w[0]).collect();
        for (i, gap) in gaps.iter().enumerate() {
            let expected = Duration::from_millis(100 * (i as u64 + 1));
            assert!(*gap >= expected && *gap < expected + Duration::from_millis(5), "gap {i}: {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let upstream = Sequence::new(vec![Ok(StatusCode::NOT_FOUND)]);
        let orchestrator = Orchestrator::new(upstream.clone(), policy(3));

        let response = orchestrator.call(&request(), ProtocolTag::Generic).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(upstream.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_network_errors() {
        let upstream = Sequence::new(vec![
            Err(UpstreamError::Network("connection reset".into())),
            Err(UpstreamError::Network("connection reset".into())),
            Ok(StatusCode::OK),
        ]);
        let orchestrator = Orchestrator::new(upstream.clone(), policy(3));

        let response = orchestrator.call(&request(), ProtocolTag::Generic).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(upstream.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_network_errors() {
        let upstream = Sequence::new(vec![Err(UpstreamError::Network("refused".into()))]);
        let orchestrator = Orchestrator::new(upstream.clone(), policy(2));

        let err = orchestrator.call(&request(), ProtocolTag::Generic).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Exhausted { attempts: 2, .. }));
        assert!(!err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_challenge_returns_immediately() {
        let upstream = Sequence::new(vec![Ok(StatusCode::UNAUTHORIZED)]);
        let orchestrator = Orchestrator::new(upstream.clone(), policy(3));

        let response = orchestrator.call(&request(), ProtocolTag::Docker).await.unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(upstream.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_is_not_retried() {
        let upstream = Sequence::new(vec![Err(UpstreamError::InvalidRequest("bad header".into()))]);
        let orchestrator = Orchestrator::new(upstream.clone(), policy(3));

        let err = orchestrator.call(&request(), ProtocolTag::Generic).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidRequest(_)));
        assert_eq!(upstream.call_times().len(), 1);
    }
}
