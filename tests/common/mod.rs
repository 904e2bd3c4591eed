//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use devgate::cache::{CacheEntry, CacheError, CacheKey, CacheStore, MemoryCacheStore};
use devgate::config::GatewayConfig;
use devgate::upstream::{UpstreamBody, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};
use devgate::HttpServer;

/// What the scripted upstream does for one call.
#[derive(Clone)]
pub enum Reply {
    Respond {
        status: StatusCode,
        headers: Vec<(&'static str, String)>,
        body: Bytes,
    },
    /// Headers at once, then each chunk after `gap`.
    Trickle {
        content_type: &'static str,
        chunks: Vec<&'static [u8]>,
        gap: Duration,
    },
    Fail,
    Hang,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Reply::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok(content_type: &str, body: &'static [u8]) -> Self {
        Reply::Respond {
            status: StatusCode::OK,
            headers: vec![("content-type", content_type.to_string())],
            body: Bytes::from_static(body),
        }
    }

    pub fn trickle(content_type: &'static str, chunks: &[&'static [u8]], gap: Duration) -> Self {
        Reply::Trickle {
            content_type,
            chunks: chunks.to_vec(),
            gap,
        }
    }

    pub fn with_header(self, name: &'static str, value: impl Into<String>) -> Self {
        match self {
            Reply::Respond {
                status,
                mut headers,
                body,
            } => {
                headers.push((name, value.into()));
                Reply::Respond {
                    status,
                    headers,
                    body,
                }
            }
            other => other,
        }
    }
}

/// A request as seen by the scripted upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request: UpstreamRequest,
    pub at: tokio::time::Instant,
}

/// In-memory `UpstreamClient` answering from a per-host script.
///
/// Replies for a host are consumed in order; the last one repeats.
#[derive(Default)]
pub struct ScriptedUpstream {
    scripts: Mutex<Vec<(String, VecDeque<Reply>)>>,
    recorded: Mutex<Vec<Recorded>>,
}

impl ScriptedUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script replies for URLs starting with `prefix`.
    pub fn script(&self, prefix: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .push((prefix.to_string(), replies.into()));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.request.url.as_str().starts_with(prefix))
            .collect()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut scripts = self.scripts.lock().unwrap();
        let (_, replies) = scripts
            .iter_mut()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())?;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = request.url.clone();
        self.recorded.lock().unwrap().push(Recorded {
            request,
            at: tokio::time::Instant::now(),
        });

        match self.next_reply(url.as_str()) {
            Some(Reply::Respond {
                status,
                headers,
                body,
            }) => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.append(
                        HeaderName::from_static(name),
                        HeaderValue::from_str(&value).unwrap(),
                    );
                }
                Ok(UpstreamResponse {
                    status,
                    headers: map,
                    body: body.into(),
                    url,
                })
            }
            Some(Reply::Trickle {
                content_type,
                chunks,
                gap,
            }) => {
                let mut map = HeaderMap::new();
                map.insert("content-type", HeaderValue::from_static(content_type));
                let body = stream::iter(chunks)
                    .then(move |chunk| async move {
                        tokio::time::sleep(gap).await;
                        Ok::<_, UpstreamError>(Bytes::from_static(chunk))
                    })
                    .boxed();
                Ok(UpstreamResponse {
                    status: StatusCode::OK,
                    headers: map,
                    body: UpstreamBody::Stream(body),
                    url,
                })
            }
            Some(Reply::Fail) => Err(UpstreamError::Network("connection refused".into())),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(UpstreamError::Network("hung".into()))
            }
            None => Ok(UpstreamResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: UpstreamBody::empty(),
                url,
            }),
        }
    }
}

/// `MemoryCacheStore` that counts every call.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryCacheStore,
    pub lookups: AtomicUsize,
    pub stores: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn touches(&self) -> usize {
        self.lookups.load(Ordering::SeqCst) + self.stores.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(key).await
    }

    async fn store(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(key, entry).await
    }
}

/// Store that fails every operation.
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    async fn lookup(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Err(CacheError::Unavailable("store offline".into()))
    }

    async fn store(&self, _key: CacheKey, _entry: CacheEntry) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("store offline".into()))
    }
}

/// Config with fast retries for tests.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.retry_base_delay_ms = 100;
    config.upstream.timeout_secs = 5;
    config
}

pub fn server(
    config: GatewayConfig,
    upstream: Arc<ScriptedUpstream>,
    store: Arc<dyn CacheStore>,
) -> HttpServer {
    HttpServer::with_components(config, upstream, store)
}

/// GET with a `Host` header.
pub fn get(path: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(path)
        .header("host", "gw.example")
}

/// Drive one request through the router in-process.
pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Start a real axum server on an ephemeral port.
pub async fn start_mock_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
