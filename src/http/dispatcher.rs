//! End-to-end request handling.
//!
//! # Responsibilities
//! - Validate, resolve and classify each inbound request
//! - Serve eligible requests from cache, otherwise go upstream (through the
//!   registry token flow for container-registry traffic)
//! - Rewrite package metadata, schedule cache writes, set response headers
//!
//! # Design Decisions
//! - One sequential pipeline per request; the only detached work is the
//!   cache write handed to `DeferredTasks`
//! - Protocol-tagged responses are passed through untouched apart from
//!   hop-by-hop stripping and `Cache-Control`
//! - Response bodies stream straight to the client; only bodies that are
//!   rewritten or stored are buffered, and only up to a size cap
//! - Every failure ends as a `GatewayError` response, never a panic

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, RANGE};
use axum::http::{HeaderMap, Method, Request};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::cache::policy::{cache_control, request_eligible};
use crate::cache::{CacheKey, CacheManager, CacheLookup, CacheStore, CachedResponse};
use crate::config::GatewayConfig;
use crate::http::request::{gateway_origin, normalize_path, request_id, RequestContext};
use crate::http::response::{apply_diagnostics, build_response, CacheStatus, GatewayError};
use crate::http::rewrite::ResponseRewriter;
use crate::lifecycle::DeferredTasks;
use crate::observability::metrics;
use crate::registry::RegistryAuthHandler;
use crate::resilience::RetryPolicy;
use crate::routing::{classify, PlatformResolver, ProtocolTag};
use crate::security::{forward_request_headers, strip_hop_by_hop, validate_method, validate_path_length};
use crate::upstream::{Buffered, Orchestrator, UpstreamClient, UpstreamRequest, UpstreamResponse};

pub struct Dispatcher {
    config: GatewayConfig,
    resolver: PlatformResolver,
    orchestrator: Orchestrator,
    registry: RegistryAuthHandler,
    cache: CacheManager,
    rewriter: ResponseRewriter,
}

/// Outcome of the pipeline before diagnostics are attached.
struct Handled {
    response: Response,
    protocol: ProtocolTag,
    cache: CacheStatus,
}

impl Dispatcher {
    pub fn new(
        config: GatewayConfig,
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn CacheStore>,
        tasks: DeferredTasks,
    ) -> Self {
        let orchestrator = Orchestrator::new(client, RetryPolicy::from_config(&config.upstream));
        Self {
            resolver: PlatformResolver::new(config.platforms.clone()),
            registry: RegistryAuthHandler::new(orchestrator.clone(), config.registry.max_redirects),
            cache: CacheManager::new(store, &config.cache, tasks),
            rewriter: ResponseRewriter::new(&config.body_rewrites),
            orchestrator,
            config,
        }
    }

    /// Handle one inbound request. Never fails; errors become responses.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let request_id = request_id(request.headers());

        let (protocol, cache, mut response) = match self.dispatch(request, &request_id).await {
            Ok(handled) => (handled.protocol, handled.cache, handled.response),
            Err((protocol, err)) => {
                if err.status().is_server_error() {
                    warn!(request_id = %request_id, error = %err, "Request failed");
                } else {
                    debug!(request_id = %request_id, error = %err, "Request rejected");
                }
                (protocol, CacheStatus::Bypass, err.into_response())
            }
        };

        if !protocol.is_protocol() {
            apply_diagnostics(response.headers_mut(), &request_id, cache, start);
        }
        let status = response.status();
        metrics::record_request(protocol.as_str(), status.as_u16(), start);
        info!(
            request_id = %request_id,
            protocol = %protocol,
            status = status.as_u16(),
            cache = %cache,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        request_id: &str,
    ) -> Result<Handled, (ProtocolTag, GatewayError)> {
        let (parts, body) = request.into_parts();
        let path = normalize_path(parts.uri.path());
        let generic = |err: GatewayError| (ProtocolTag::Generic, err);

        validate_path_length(&path, &self.config.security).map_err(generic)?;
        let resolution = self
            .resolver
            .resolve(&path)
            .ok_or_else(|| generic(GatewayError::NoPlatform(path.clone())))?;
        let protocol = classify(&path, &parts.headers);
        let tagged = |err: GatewayError| (protocol, err);

        validate_method(&parts.method, protocol, &self.config.security).map_err(tagged)?;
        let body = self.buffer_body(&parts.headers, body).await.map_err(tagged)?;
        let upstream_url = self
            .resolver
            .upstream_url(&resolution, parts.uri.query())
            .map_err(|e| tagged(GatewayError::InvalidUpstream(e.to_string())))?;

        let ctx = RequestContext {
            request_id: request_id.to_string(),
            origin: gateway_origin(&parts),
            method: parts.method,
            path,
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            resolution,
            upstream_url,
            protocol,
        };
        debug!(
            request_id = %ctx.request_id,
            platform = ctx.platform_key(),
            protocol = %protocol,
            upstream = %ctx.upstream_url,
            "Resolved request"
        );

        self.proxy(ctx, body).await.map_err(tagged)
    }

    async fn buffer_body(&self, headers: &HeaderMap, body: Body) -> Result<Bytes, GatewayError> {
        let limit = self.config.upstream.max_body_bytes;
        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(GatewayError::PayloadTooLarge(limit));
        }
        axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| GatewayError::PayloadTooLarge(limit))
    }

    async fn proxy(&self, ctx: RequestContext, body: Bytes) -> Result<Handled, GatewayError> {
        let eligible = request_eligible(&ctx.method, ctx.protocol, &ctx.headers);
        let range = ctx
            .headers
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let key = if eligible && self.cache.enabled() {
            ctx.inbound_url().map(|url| CacheKey::new(&ctx.method, &url))
        } else {
            None
        };

        let cache_status = match &key {
            Some(key) => match self.cache.check(key, range.as_deref()).await {
                CacheLookup::Hit(hit) => {
                    debug!(request_id = %ctx.request_id, key = %key, "Cache hit");
                    return Ok(Handled {
                        response: cached_response(hit),
                        protocol: ctx.protocol,
                        cache: CacheStatus::Hit,
                    });
                }
                CacheLookup::Miss => {
                    metrics::record_cache_event("miss");
                    CacheStatus::Miss
                }
            },
            None => {
                metrics::record_cache_event("bypass");
                CacheStatus::Bypass
            }
        };

        let rewrite = self.rewriter.applies_to(ctx.platform_key());
        // Anything that may be rewritten or shared must arrive unencoded.
        let identity_only = rewrite || key.is_some();
        let request = UpstreamRequest {
            method: ctx.method.clone(),
            url: ctx.upstream_url.clone(),
            headers: forward_request_headers(&ctx.headers, identity_only),
            body,
        };

        let upstream = if ctx.protocol == ProtocolTag::Docker {
            self.registry.fetch(request).await?
        } else {
            self.orchestrator.call(&request, ctx.protocol).await?
        };

        if !ctx.protocol.is_protocol() && upstream.status.is_server_error() {
            return Err(GatewayError::UpstreamStatus(upstream.status));
        }

        let UpstreamResponse {
            status,
            mut headers,
            body,
            ..
        } = upstream;
        strip_hop_by_hop(&mut headers);

        let rewriting = rewrite && ctx.origin.is_some();
        let storing = key.is_some() && self.cache.accepts(range.is_some(), status, &headers);

        let body = if rewriting || storing {
            let limit = self.config.upstream.max_buffered_response_bytes;
            match body.buffer(limit).await? {
                Buffered::Complete(mut bytes) => {
                    if let Some(origin) = ctx.origin.as_deref().filter(|_| rewriting) {
                        if let Some(rewritten) = self.rewriter.rewrite(ctx.platform_key(), origin, &headers, &bytes) {
                            debug!(request_id = %ctx.request_id, platform = ctx.platform_key(), "Rewrote upstream links");
                            bytes = rewritten;
                            headers.remove(CONTENT_LENGTH);
                        }
                    }
                    if let Some(key) = key.as_ref().filter(|_| storing) {
                        self.cache.schedule_store(key, range.as_deref(), status, &headers, &bytes);
                    }
                    Body::from(bytes)
                }
                Buffered::Overflow(stream) => {
                    debug!(
                        request_id = %ctx.request_id,
                        limit,
                        "Response too large to buffer, streaming without rewrite or cache"
                    );
                    Body::from_stream(stream)
                }
            }
        } else {
            body.into_body()
        };

        headers.insert(CACHE_CONTROL, cache_control(eligible, status, self.cache.ttl()));
        if ctx.method != Method::HEAD {
            headers.remove(CONTENT_LENGTH);
        }

        Ok(Handled {
            response: build_response(status, headers, body),
            protocol: ctx.protocol,
            cache: cache_status,
        })
    }
}

fn cached_response(hit: CachedResponse) -> Response {
    let CachedResponse {
        status,
        mut headers,
        body,
        max_age,
    } = hit;
    headers.insert(CACHE_CONTROL, cache_control(true, status, max_age));
    build_response(status, headers, body)
}
