//! Container-registry token exchange and redirect sanitization.
//!
//! # Responsibilities
//! - Answer a registry 401 with one anonymous token fetch and one retry
//! - Follow redirects by hand, never forwarding `Authorization`
//! - Fall back to the original 401 whenever the token flow cannot finish
//!
//! # Design Decisions
//! - The outbound client never follows redirects itself, so credentials
//!   cannot reach a storage host by accident
//! - The redirect chain is capped; overflow is the only flow error that
//!   reaches the caller as a failure

use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::observability::metrics;
use crate::registry::challenge::{scope_from_path, BearerChallenge};
use crate::routing::ProtocolTag;
use crate::upstream::{Orchestrator, UpstreamError, UpstreamRequest, UpstreamResponse};

/// Where a registry request is in the token flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    TokenRequested,
    Authorized,
    Redirected,
    Resolved,
    Failed,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::TokenRequested => "token_requested",
            AuthState::Authorized => "authorized",
            AuthState::Redirected => "redirected",
            AuthState::Resolved => "resolved",
            AuthState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthState::Resolved | AuthState::Failed)
    }
}

/// Failures inside the registry flow.
#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error("malformed WWW-Authenticate challenge: {0}")]
    MalformedChallenge(String),

    #[error("401 without a WWW-Authenticate challenge")]
    MissingChallenge,

    #[error("token endpoint returned {0}")]
    TokenEndpoint(StatusCode),

    #[error("unusable token response: {0}")]
    TokenResponse(String),

    #[error("registry rejected the issued token")]
    RepeatedChallenge,

    #[error("more than {0} redirects")]
    TooManyRedirects(usize),

    #[error("invalid redirect location: {0}")]
    InvalidRedirect(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

const MAX_TOKEN_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Registry-specific layer over the orchestrator.
#[derive(Clone)]
pub struct RegistryAuthHandler {
    orchestrator: Orchestrator,
    max_redirects: usize,
}

impl RegistryAuthHandler {
    pub fn new(orchestrator: Orchestrator, max_redirects: usize) -> Self {
        Self {
            orchestrator,
            max_redirects,
        }
    }

    /// Run `request` through the token flow and return the final response.
    ///
    /// A failed token exchange or a rejected token yields the registry's
    /// original 401 so clients see the real challenge.
    pub async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse, AuthFlowError> {
        let mut state = AuthState::Unauthenticated;
        enter(&mut state, AuthState::Unauthenticated, &request);

        let first = self.orchestrator.call(&request, ProtocolTag::Docker).await?;
        if first.status != StatusCode::UNAUTHORIZED || request.headers.contains_key(AUTHORIZATION) {
            return self.follow_redirects(&mut state, request, first).await;
        }

        enter(&mut state, AuthState::TokenRequested, &request);
        let bearer = match self.request_token(&first.headers, &request).await {
            Ok(bearer) => bearer,
            Err(err) => {
                warn!(url = %request.url, error = %err, "Registry token exchange failed");
                enter(&mut state, AuthState::Failed, &request);
                return Ok(first);
            }
        };

        enter(&mut state, AuthState::Authorized, &request);
        let mut authorized = request.clone();
        authorized.headers.insert(AUTHORIZATION, bearer);

        let response = self.orchestrator.call(&authorized, ProtocolTag::Docker).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            warn!(url = %request.url, error = %AuthFlowError::RepeatedChallenge, "Giving up on registry auth");
            enter(&mut state, AuthState::Failed, &request);
            return Ok(first);
        }

        self.follow_redirects(&mut state, authorized, response).await
    }

    async fn request_token(
        &self,
        challenge_headers: &HeaderMap,
        request: &UpstreamRequest,
    ) -> Result<HeaderValue, AuthFlowError> {
        let header = challenge_headers
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthFlowError::MissingChallenge)?;
        let challenge = BearerChallenge::parse(header)?;
        let url = challenge.token_url(scope_from_path(request.url.path()).as_deref());

        debug!(token_url = %url, "Requesting anonymous registry token");
        let response = self
            .orchestrator
            .call(&UpstreamRequest::get(url), ProtocolTag::Generic)
            .await?;
        if !response.status.is_success() {
            return Err(AuthFlowError::TokenEndpoint(response.status));
        }

        let body = response.body.collect(MAX_TOKEN_RESPONSE_BYTES).await?;
        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| AuthFlowError::TokenResponse(e.to_string()))?;
        let token = parsed
            .token
            .or(parsed.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthFlowError::TokenResponse("no token field".into()))?;
        HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AuthFlowError::TokenResponse("token is not a valid header value".into()))
    }

    /// Follow redirects by hand, stripping `Authorization` before every hop.
    async fn follow_redirects(
        &self,
        state: &mut AuthState,
        mut request: UpstreamRequest,
        mut response: UpstreamResponse,
    ) -> Result<UpstreamResponse, AuthFlowError> {
        let mut hops = 0;

        while response.is_redirect() {
            let Some(location) = response.location() else {
                break;
            };
            if hops == self.max_redirects {
                enter(state, AuthState::Failed, &request);
                return Err(AuthFlowError::TooManyRedirects(self.max_redirects));
            }
            hops += 1;

            let next_url = response
                .url
                .join(location)
                .map_err(|_| AuthFlowError::InvalidRedirect(location.to_string()))?;
            enter(state, AuthState::Redirected, &request);

            request = next_hop(request, response.status, next_url);
            debug!(hop = hops, target = %request.url, "Following registry redirect");
            response = self.orchestrator.call(&request, ProtocolTag::Docker).await?;
        }

        enter(state, AuthState::Resolved, &request);
        Ok(response)
    }
}

fn next_hop(mut request: UpstreamRequest, status: StatusCode, url: url::Url) -> UpstreamRequest {
    request.headers.remove(AUTHORIZATION);
    request.url = url;

    let switch_to_get = matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
    ) && request.method != Method::HEAD;
    if switch_to_get {
        request.method = Method::GET;
        request.body = Bytes::new();
        request.headers.remove(CONTENT_LENGTH);
        request.headers.remove(CONTENT_TYPE);
    }
    request
}

fn enter(state: &mut AuthState, next: AuthState, request: &UpstreamRequest) {
    *state = next;
    metrics::record_registry_auth(next.as_str());
    debug!(url = %request.url, state = next.as_str(), terminal = next.is_terminal(), "Registry auth transition");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;
    use url::Url;

    fn request(method: Method) -> UpstreamRequest {
        let mut req = UpstreamRequest::get(Url::parse("https://registry.example/v2/a/blobs/x").unwrap());
        req.method = method;
        req.headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        req.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        req.headers.insert(LOCATION, HeaderValue::from_static("kept"));
        req.body = Bytes::from_static(b"{}");
        req
    }

    fn target() -> Url {
        Url::parse("https://storage.example/blob").unwrap()
    }

    #[test]
    fn test_hop_strips_authorization() {
        let hop = next_hop(request(Method::GET), StatusCode::TEMPORARY_REDIRECT, target());
        assert!(!hop.headers.contains_key(AUTHORIZATION));
        assert_eq!(hop.url, target());
        assert!(hop.headers.contains_key(LOCATION));
    }

    #[test]
    fn test_see_other_switches_to_get() {
        let hop = next_hop(request(Method::POST), StatusCode::SEE_OTHER, target());
        assert_eq!(hop.method, Method::GET);
        assert!(hop.body.is_empty());
        assert!(!hop.headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_method_kept_for_307_and_head() {
        let hop = next_hop(request(Method::PUT), StatusCode::TEMPORARY_REDIRECT, target());
        assert_eq!(hop.method, Method::PUT);
        assert_eq!(hop.body, Bytes::from_static(b"{}"));

        let hop = next_hop(request(Method::HEAD), StatusCode::FOUND, target());
        assert_eq!(hop.method, Method::HEAD);
    }

    #[test]
    fn test_terminal_states() {
        assert!(AuthState::Resolved.is_terminal());
        assert!(AuthState::Failed.is_terminal());
        assert!(!AuthState::Redirected.is_terminal());
        assert_eq!(AuthState::TokenRequested.as_str(), "token_requested");
    }
}
