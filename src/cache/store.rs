//! Cache storage seam and the in-process default.
//!
//! # Responsibilities
//! - Define the atomic lookup/store interface the cache manager relies on
//! - Provide a `DashMap`-backed store with expiry, entry and byte bounds
//!
//! # Design Decisions
//! - Entries carry an absolute expiry; expired entries are misses
//! - Expired entries are reclaimed by a periodic sweep, not only on lookup
//! - Store failures are reported, never retried; callers drop them

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::cache::key::CacheKey;
use crate::config::CacheConfig;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache store is full ({0})")]
    Full(&'static str),

    #[error("entry of {0} bytes exceeds the store byte bound")]
    TooLarge(usize),
}

/// A stored response snapshot.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub expires_at: SystemTime,
}

impl CacheEntry {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining_ttl(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or(Duration::ZERO)
    }

    fn size(&self) -> usize {
        self.body.len()
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    async fn store(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError>;

    /// Reclaim expired entries; returns how many were dropped.
    ///
    /// Stores that expire entries on their own keep the default.
    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        Ok(0)
    }
}

/// In-memory store shared by all requests of one process.
///
/// `Default` is unbounded; the server builds it from `CacheConfig`.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    max_entries: Option<usize>,
    max_bytes: Option<usize>,
    bytes: AtomicUsize,
}

impl MemoryCacheStore {
    pub fn new(max_entries: Option<usize>, max_bytes: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            max_bytes,
            bytes: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.max_bytes)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Body bytes currently held.
    pub fn size_bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut dropped = 0;
        self.entries.retain(|_, entry| {
            if entry.is_expired(now) {
                self.bytes.fetch_sub(entry.size(), Ordering::Relaxed);
                dropped += 1;
                false
            } else {
                true
            }
        });
        dropped
    }

    fn has_room(&self, new_entry: bool, incoming: usize, replaced: usize) -> bool {
        let entries_ok = self
            .max_entries
            .is_none_or(|max| !new_entry || self.entries.len() < max);
        let bytes_ok = self
            .max_bytes
            .is_none_or(|max| self.size_bytes().saturating_sub(replaced) + incoming <= max);
        entries_ok && bytes_ok
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let now = SystemTime::now();
        if let Some(entry) = self.entries.get(key.as_str()) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.clone()));
            }
        } else {
            return Ok(None);
        }
        // Read guard must be released before remove_if.
        if let Some((_, removed)) = self.entries.remove_if(key.as_str(), |_, entry| entry.is_expired(now)) {
            self.bytes.fetch_sub(removed.size(), Ordering::Relaxed);
        }
        Ok(None)
    }

    async fn store(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        let incoming = entry.size();
        if self.max_bytes.is_some_and(|max| incoming > max) {
            return Err(CacheError::TooLarge(incoming));
        }

        let replaced = self.entries.get(key.as_str()).map(|e| e.size());
        if !self.has_room(replaced.is_none(), incoming, replaced.unwrap_or(0)) {
            self.purge_expired();
            let replaced = self.entries.get(key.as_str()).map(|e| e.size());
            if !self.has_room(replaced.is_none(), incoming, replaced.unwrap_or(0)) {
                let bound = if self.max_entries.is_some_and(|max| self.entries.len() >= max) {
                    "entry bound"
                } else {
                    "byte bound"
                };
                return Err(CacheError::Full(bound));
            }
        }

        self.bytes.fetch_add(incoming, Ordering::Relaxed);
        if let Some(old) = self.entries.insert(key.as_str().to_string(), entry) {
            self.bytes.fetch_sub(old.size(), Ordering::Relaxed);
        }
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        Ok(self.purge_expired())
    }
}

/// Sweep `store` every `every` until `shutdown` fires.
pub fn spawn_sweeper(
    store: Arc<dyn CacheStore>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        // The first tick fires immediately; nothing can be expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.sweep_expired().await {
                        Ok(0) => {}
                        Ok(dropped) => tracing::debug!(dropped, "Swept expired cache entries"),
                        Err(err) => tracing::warn!(error = %err, "Cache sweep failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Cache sweeper stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use url::Url;

    fn key(path: &str) -> CacheKey {
        CacheKey::new(&Method::GET, &Url::parse(&format!("https://gw.example{path}")).unwrap())
    }

    fn entry(ttl: Duration) -> CacheEntry {
        CacheEntry {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"hello"),
            expires_at: SystemTime::now() + ttl,
        }
    }

    fn expired() -> CacheEntry {
        CacheEntry {
            expires_at: SystemTime::now() - Duration::from_secs(1),
            ..entry(Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let store = MemoryCacheStore::default();
        store.store(key("/a"), entry(Duration::from_secs(60))).await.unwrap();

        let hit = store.lookup(&key("/a")).await.unwrap().unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"hello"));
        assert!(store.lookup(&key("/b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_evicted() {
        let store = MemoryCacheStore::default();
        store.store(key("/a"), expired()).await.unwrap();

        assert!(store.lookup(&key("/a")).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_store_purges_then_refuses() {
        let store = MemoryCacheStore::new(Some(2), None);
        store.store(key("/old"), expired()).await.unwrap();
        store.store(key("/a"), entry(Duration::from_secs(60))).await.unwrap();

        // The expired entry makes room.
        store.store(key("/b"), entry(Duration::from_secs(60))).await.unwrap();
        assert_eq!(store.len(), 2);

        let err = store.store(key("/c"), entry(Duration::from_secs(60))).await.unwrap_err();
        assert!(matches!(err, CacheError::Full("entry bound")));

        // Overwriting an existing key is always allowed.
        store.store(key("/a"), entry(Duration::from_secs(120))).await.unwrap();
    }

    #[test]
    fn test_remaining_ttl() {
        let e = entry(Duration::from_secs(30));
        let ttl = e.remaining_ttl(SystemTime::now());
        assert!(ttl <= Duration::from_secs(30) && ttl > Duration::from_secs(28));
        assert_eq!(expired().remaining_ttl(SystemTime::now()), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_byte_bound() {
        // Each entry body is 5 bytes.
        let store = MemoryCacheStore::new(None, Some(12));
        store.store(key("/a"), entry(Duration::from_secs(60))).await.unwrap();
        store.store(key("/b"), entry(Duration::from_secs(60))).await.unwrap();
        assert_eq!(store.size_bytes(), 10);

        let err = store.store(key("/c"), entry(Duration::from_secs(60))).await.unwrap_err();
        assert!(matches!(err, CacheError::Full("byte bound")));

        // Replacing an entry only counts the difference.
        store.store(key("/a"), entry(Duration::from_secs(120))).await.unwrap();
        assert_eq!(store.size_bytes(), 10);

        let huge = CacheEntry {
            body: Bytes::from(vec![0u8; 64]),
            ..entry(Duration::from_secs(60))
        };
        assert!(matches!(store.store(key("/d"), huge).await, Err(CacheError::TooLarge(64))));
    }

    #[tokio::test]
    async fn test_purge_releases_bytes() {
        let store = MemoryCacheStore::default();
        store.store(key("/old"), expired()).await.unwrap();
        store.store(key("/older"), expired()).await.unwrap();
        store.store(key("/fresh"), entry(Duration::from_secs(60))).await.unwrap();

        assert_eq!(store.sweep_expired().await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.size_bytes(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_entries_nobody_looks_up() {
        let store = Arc::new(MemoryCacheStore::default());
        let (tx, rx) = broadcast::channel(1);
        let sweeper = spawn_sweeper(store.clone(), Duration::from_secs(60), rx);

        store.store(key("/gone"), expired()).await.unwrap();
        store.store(key("/kept"), entry(Duration::from_secs(3600))).await.unwrap();
        assert_eq!(store.len(), 2);

        time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.size_bytes(), 5);

        tx.send(()).unwrap();
        sweeper.await.unwrap();
    }
}
