use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use tracing::{event, Level};

use crate::object_id::ImageId;

/// Prefix shared by every key this service writes to a cache.
pub const KEY_NAMESPACE: &str = "visuasort:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cached value is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A string key-value store with per-entry expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Remove every entry in the service's namespace, returning how many were removed.
    async fn clear(&self) -> Result<u64, CacheError>;
    /// Number of live entries.
    async fn len(&self) -> Result<u64, CacheError>;

    /// Drop expired entries. Backends that expire entries themselves have
    /// nothing to do here.
    async fn cleanup(&self) -> Result<u64, CacheError> {
        Ok(0)
    }
}

/// The logical keys cached in front of the metadata store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKey<'a> {
    /// All records of an owner.
    Listing(&'a str),
    /// The distinct tags of an owner.
    Tags(&'a str),
    /// A single record.
    Image { owner: &'a str, id: &'a ImageId },
}

impl<'a> CacheKey<'a> {
    pub fn ttl(&self, ttls: &CacheTtls) -> Duration {
        match self {
            CacheKey::Listing(_) => ttls.listing,
            CacheKey::Tags(_) => ttls.tags,
            CacheKey::Image { .. } => ttls.image,
        }
    }
}

impl<'a> std::fmt::Display for CacheKey<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Listing(owner) => write!(f, "{KEY_NAMESPACE}user_images:{owner}"),
            CacheKey::Tags(owner) => write!(f, "{KEY_NAMESPACE}tag_categories:{owner}"),
            CacheKey::Image { owner, id } => {
                write!(f, "{KEY_NAMESPACE}image_metadata:{owner}:{id}")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTtls {
    pub listing: Duration,
    pub tags: Duration,
    pub image: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        CacheTtls {
            listing: Duration::from_secs(120),
            tags: Duration::from_secs(600),
            image: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires: Instant,
}

/// Cache entries held in process memory. Expired entries are never returned,
/// but stay allocated until `cleanup` runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires > now)
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().await;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }

    async fn len(&self) -> Result<u64, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.values().filter(|e| e.expires > now).count() as u64)
    }

    async fn cleanup(&self) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires > now);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    invalidations: AtomicU64,
    stale_fills: AtomicU64,
    errors: AtomicU64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub backend: String,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    /// Fills dropped because a mutation raced the read.
    pub stale_fills: u64,
    pub errors: u64,
    pub hit_rate: f64,
    /// None if the backend could not be asked.
    pub entries: Option<u64>,
}

/// Taken before reading the store to fill the cache. Any invalidation after
/// that point makes the fill a no-op, so a slow reader can't put back a value
/// that a writer has already replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Generation(u64);

/// Typed, best-effort access to a [CacheBackend]. Backend failures are logged
/// and counted, and then treated as a miss.
#[derive(Clone, Debug)]
pub struct ReadThroughCache {
    backend: Arc<dyn CacheBackend>,
    ttls: CacheTtls,
    counters: Arc<Counters>,
    /// Bumped by every invalidation. Held across fills and invalidations so
    /// the two never interleave.
    generation: Arc<Mutex<u64>>,
}

impl ReadThroughCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttls: CacheTtls) -> Self {
        ReadThroughCache {
            backend,
            ttls,
            counters: Arc::new(Counters::default()),
            generation: Arc::new(Mutex::new(0)),
        }
    }

    fn record_error(&self, op: &'static str, key: &str, error: &CacheError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        event!(Level::WARN, %key, %error, op, "cache operation failed");
    }

    pub async fn get<T: DeserializeOwned>(&self, key: CacheKey<'_>) -> Option<T> {
        let key = key.to_string();
        match self.backend.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    event!(Level::DEBUG, %key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    self.record_error("decode", &key, &CacheError::from(e));
                    // Drop the corrupt entry so the next read repopulates it.
                    if let Err(e) = self.backend.delete(&key).await {
                        self.record_error("delete", &key, &e);
                    }
                    None
                }
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                event!(Level::DEBUG, %key, "cache miss");
                None
            }
            Err(e) => {
                self.record_error("get", &key, &e);
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: CacheKey<'_>, value: &T) {
        let ttl = key.ttl(&self.ttls);
        let key = key.to_string();
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                self.record_error("encode", &key, &CacheError::from(e));
                return;
            }
        };

        match self.backend.set(&key, json, ttl).await {
            Ok(()) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.record_error("set", &key, &e),
        }
    }

    pub async fn generation(&self) -> Generation {
        Generation(*self.generation.lock().await)
    }

    /// Store a value read from the store, unless an invalidation happened
    /// since `generation` was taken.
    pub async fn fill<T: Serialize + ?Sized>(
        &self,
        generation: Generation,
        key: CacheKey<'_>,
        value: &T,
    ) {
        let current = self.generation.lock().await;
        if *current != generation.0 {
            self.counters.stale_fills.fetch_add(1, Ordering::Relaxed);
            event!(Level::DEBUG, %key, "skipping fill of a stale read");
            return;
        }

        self.set(key, value).await;
    }

    pub async fn invalidate(&self, key: CacheKey<'_>) {
        self.invalidate_all(&[key]).await;
    }

    pub async fn invalidate_all(&self, keys: &[CacheKey<'_>]) {
        let mut current = self.generation.lock().await;
        *current += 1;
        for key in keys {
            let key = key.to_string();
            match self.backend.delete(&key).await {
                Ok(()) => {
                    self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => self.record_error("delete", &key, &e),
            }
        }
    }

    /// Unlike the other operations, administrative calls report backend failures.
    pub async fn clear(&self) -> Result<u64, CacheError> {
        let removed = self.backend.clear().await?;
        event!(Level::INFO, removed, "cache cleared");
        Ok(removed)
    }

    pub async fn cleanup(&self) -> Result<u64, CacheError> {
        self.backend.cleanup().await
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let entries = match self.backend.len().await {
            Ok(n) => Some(n),
            Err(e) => {
                self.record_error("len", "*", &e);
                None
            }
        };

        CacheStats {
            backend: self.backend.name().to_string(),
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            stale_fills: self.counters.stale_fills.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
            entries,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        let id = ImageId::new();
        assert_eq!(CacheKey::Listing("alice").to_string(), "visuasort:user_images:alice");
        assert_eq!(
            CacheKey::Tags("alice").to_string(),
            "visuasort:tag_categories:alice"
        );
        assert_eq!(
            CacheKey::Image {
                owner: "alice",
                id: &id
            }
            .to_string(),
            format!("visuasort:image_metadata:alice:{id}")
        );
    }

    #[test]
    fn default_ttls() {
        let ttls = CacheTtls::default();
        assert_eq!(CacheKey::Listing("a").ttl(&ttls), Duration::from_secs(120));
        assert_eq!(CacheKey::Tags("a").ttl(&ttls), Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn memory_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("a", "1".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        cache
            .set("b", "2".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.len().await.unwrap(), 1);
        assert_eq!(cache.cleanup().await.unwrap(), 1);
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));
        assert_eq!(cache.clear().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn typed_round_trip_and_stats() {
        let cache = ReadThroughCache::new(Arc::new(MemoryCache::new()), CacheTtls::default());
        let key = CacheKey::Tags("alice");

        assert_eq!(cache.get::<Vec<String>>(key).await, None);
        cache.set(key, &vec!["sea".to_string()]).await;
        assert_eq!(cache.get::<Vec<String>>(key).await, Some(vec!["sea".to_string()]));
        cache.invalidate(key).await;
        assert_eq!(cache.get::<Vec<String>>(key).await, None);

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.sets), (1, 2, 1));
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.entries, Some(0));
        assert_eq!(stats.backend, "memory");
    }

    #[tokio::test]
    async fn fills_after_an_invalidation_are_dropped() {
        let cache = ReadThroughCache::new(Arc::new(MemoryCache::new()), CacheTtls::default());
        let key = CacheKey::Tags("alice");

        let before = cache.generation().await;
        cache.invalidate(CacheKey::Listing("alice")).await;
        cache.fill(before, key, &vec!["old".to_string()]).await;
        assert_eq!(cache.get::<Vec<String>>(key).await, None);

        let now = cache.generation().await;
        assert_ne!(now, before);
        cache.fill(now, key, &vec!["new".to_string()]).await;
        assert_eq!(cache.get::<Vec<String>>(key).await, Some(vec!["new".to_string()]));

        let stats = cache.stats().await;
        assert_eq!((stats.sets, stats.stale_fills), (1, 1));
    }

    #[tokio::test]
    async fn corrupt_entries_are_dropped() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set("visuasort:tag_categories:alice", "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = ReadThroughCache::new(backend.clone(), CacheTtls::default());

        assert_eq!(cache.get::<Vec<String>>(CacheKey::Tags("alice")).await, None);
        assert_eq!(backend.len().await.unwrap(), 0);
        assert_eq!(cache.stats().await.errors, 1);
    }

    #[tokio::test]
    async fn backend_failures_are_absorbed() {
        let cache = ReadThroughCache::new(
            Arc::new(test_util::BrokenCache),
            CacheTtls::default(),
        );
        let key = CacheKey::Listing("alice");
        cache.set(key, &vec![1, 2, 3]).await;
        assert_eq!(cache.get::<Vec<u32>>(key).await, None);
        cache.invalidate(key).await;

        let stats = cache.stats().await;
        assert_eq!(stats.errors, 4);
        assert_eq!(stats.entries, None);
        assert!(cache.clear().await.is_err());
    }
}
