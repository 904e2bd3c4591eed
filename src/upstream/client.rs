//! Outbound HTTP client.
//!
//! # Responsibilities
//! - Define the request/response pair exchanged with upstreams
//! - Hide the concrete HTTP client behind `UpstreamClient`
//! - Never follow redirects on its own
//!
//! # Design Decisions
//! - Requests are buffered so they can be replayed on retry
//! - `send` resolves once response headers arrive; the body stays a stream
//!   until a caller decides to buffer it
//! - The attempt deadline is applied by the orchestrator around `send`;
//!   body reads are bounded by the client's idle read timeout instead

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;

/// Errors from an outbound call.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("upstream body larger than {0} bytes")]
    BodyTooLarge(usize),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<UpstreamError>,
    },
}

impl UpstreamError {
    /// Whether the final failure was a deadline rather than a connection error.
    pub fn is_timeout(&self) -> bool {
        match self {
            UpstreamError::Timeout(_) => true,
            UpstreamError::Exhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }
}

/// A fully buffered outbound request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    /// Body-less GET with no headers.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

pub type ByteStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// Response body as received from the upstream.
pub enum UpstreamBody {
    Full(Bytes),
    Stream(ByteStream),
}

/// Result of reading a body up to a size limit.
pub enum Buffered {
    Complete(Bytes),
    /// The limit was crossed; the stream replays what was read, then the rest.
    Overflow(ByteStream),
}

impl UpstreamBody {
    pub fn empty() -> Self {
        UpstreamBody::Full(Bytes::new())
    }

    /// Read the body into memory unless it is larger than `limit`.
    pub async fn buffer(self, limit: usize) -> Result<Buffered, UpstreamError> {
        let mut stream = match self {
            UpstreamBody::Full(bytes) if bytes.len() <= limit => return Ok(Buffered::Complete(bytes)),
            UpstreamBody::Full(bytes) => {
                let replay = stream::once(async move { Ok::<_, UpstreamError>(bytes) });
                return Ok(Buffered::Overflow(replay.boxed()));
            }
            UpstreamBody::Stream(stream) => stream,
        };

        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > limit {
                let head = stream::iter([Ok(buf.freeze()), Ok(chunk)]);
                return Ok(Buffered::Overflow(head.chain(stream).boxed()));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(Buffered::Complete(buf.freeze()))
    }

    /// Read the whole body, failing once it grows past `limit`.
    pub async fn collect(self, limit: usize) -> Result<Bytes, UpstreamError> {
        match self.buffer(limit).await? {
            Buffered::Complete(bytes) => Ok(bytes),
            Buffered::Overflow(_) => Err(UpstreamError::BodyTooLarge(limit)),
        }
    }

    pub fn into_body(self) -> Body {
        match self {
            UpstreamBody::Full(bytes) => Body::from(bytes),
            UpstreamBody::Stream(stream) => Body::from_stream(stream),
        }
    }
}

impl From<Bytes> for UpstreamBody {
    fn from(bytes: Bytes) -> Self {
        UpstreamBody::Full(bytes)
    }
}

impl fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            UpstreamBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Upstream response with headers received and the body pending.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
    /// URL the response was served from.
    pub url: Url,
}

impl UpstreamResponse {
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection() && self.status != StatusCode::NOT_MODIFIED
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }
}

/// Issues a single outbound call. Implementations must not follow redirects.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// `reqwest`-backed client with automatic redirects disabled.
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = request.url.clone();
        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(map_reqwest_error).boxed();

        Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Stream(body),
            url,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> UpstreamError {
    if err.is_builder() {
        UpstreamError::InvalidRequest(err.to_string())
    } else if err.is_timeout() {
        UpstreamError::Network(format!("read stalled: {err}"))
    } else {
        UpstreamError::Network(err.to_string())
    }
}
