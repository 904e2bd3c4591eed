//! Cache lookups and deferred population.
//!
//! # Responsibilities
//! - Serve eligible requests from the store (full body or a local range slice)
//! - Schedule writes of storable responses after the response is sent
//! - Swallow every store failure: a broken store is a miss or a dropped write
//!
//! # Design Decisions
//! - Lookup order for a ranged request: range key, then full-content key
//! - Multi-range or unparsable `Range` values always go upstream
//! - Stored snapshots never keep `Set-Cookie` or hop-by-hop headers

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::key::CacheKey;
use crate::cache::policy::{identity_encoded, response_storable};
use crate::cache::range::{content_range, unsatisfied_range, RangeSpec, ResolvedRange};
use crate::cache::store::{CacheEntry, CacheStore};
use crate::config::CacheConfig;
use crate::lifecycle::DeferredTasks;
use crate::observability::metrics;
use crate::security::strip_hop_by_hop;

/// A response produced from the cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Freshness left on the underlying entry.
    pub max_age: Duration,
}

#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(CachedResponse),
    Miss,
}

#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    enabled: bool,
    tasks: DeferredTasks,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig, tasks: DeferredTasks) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(config.duration_secs),
            enabled: config.enabled,
            tasks,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up an eligible request. `range` is the raw `Range` header, if any.
    pub async fn check(&self, key: &CacheKey, range: Option<&str>) -> CacheLookup {
        let Some(range) = range else {
            return self.lookup(key).await.map_or(CacheLookup::Miss, |entry| {
                metrics::record_cache_event("hit");
                CacheLookup::Hit(into_cached(entry))
            });
        };

        if let Some(entry) = self.lookup(&key.with_range(range)).await {
            metrics::record_cache_event("hit");
            return CacheLookup::Hit(into_cached(entry));
        }

        let Some(spec) = RangeSpec::parse(range) else {
            debug!(range, "Range not served from cache");
            return CacheLookup::Miss;
        };
        match self.lookup(key).await {
            Some(entry) if entry.status == StatusCode::OK => {
                metrics::record_cache_event("range_slice");
                CacheLookup::Hit(slice(entry, spec))
            }
            _ => CacheLookup::Miss,
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.store.lookup(key).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key = %key, error = %err, "Cache lookup failed, treating as miss");
                metrics::record_cache_event("lookup_error");
                None
            }
        }
    }

    /// Whether a response with this status and these headers would be stored.
    pub fn accepts(&self, ranged: bool, status: StatusCode, headers: &HeaderMap) -> bool {
        self.enabled && response_storable(status, ranged) && identity_encoded(headers)
    }

    /// Queue a write of the final response; returns whether one was queued.
    pub fn schedule_store(
        &self,
        key: &CacheKey,
        range: Option<&str>,
        status: StatusCode,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> bool {
        if !self.accepts(range.is_some(), status, headers) {
            return false;
        }

        // Only a 206 belongs to its range; a full body serves every range.
        let key = match range {
            Some(range) if status == StatusCode::PARTIAL_CONTENT => key.with_range(range),
            _ => key.clone(),
        };
        let mut headers = headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(SET_COOKIE);
        headers.remove(CONTENT_LENGTH);

        let entry = CacheEntry {
            status,
            headers,
            body: body.clone(),
            expires_at: SystemTime::now() + self.ttl,
        };
        let store = self.store.clone();
        self.tasks.spawn("cache_store", async move {
            match store.store(key.clone(), entry).await {
                Ok(()) => {
                    debug!(key = %key, "Cached response");
                    metrics::record_cache_event("store");
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Cache write dropped");
                    metrics::record_cache_event("store_error");
                }
            }
        });
        true
    }
}

fn into_cached(entry: CacheEntry) -> CachedResponse {
    let max_age = entry.remaining_ttl(SystemTime::now());
    CachedResponse {
        status: entry.status,
        headers: entry.headers,
        body: entry.body,
        max_age,
    }
}

/// Cut a 206 (or a 416) out of a cached full body.
fn slice(entry: CacheEntry, spec: RangeSpec) -> CachedResponse {
    let total = entry.body.len() as u64;
    let mut cached = into_cached(entry);

    match spec.resolve(total) {
        ResolvedRange::Satisfiable(range) => {
            let value = content_range(&range, total);
            cached.body = cached
                .body
                .slice(*range.start() as usize..=*range.end() as usize);
            cached.status = StatusCode::PARTIAL_CONTENT;
            if let Ok(v) = HeaderValue::from_str(&value) {
                cached.headers.insert(CONTENT_RANGE, v);
            }
        }
        ResolvedRange::Unsatisfiable => {
            cached.status = StatusCode::RANGE_NOT_SATISFIABLE;
            cached.body = Bytes::new();
            if let Ok(v) = HeaderValue::from_str(&unsatisfied_range(total)) {
                cached.headers.insert(CONTENT_RANGE, v);
            }
        }
    }
    cached
}
