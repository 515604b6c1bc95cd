//! Keyed metadata cache with TTL expiry and capacity-bounded LRU eviction.
//!
//! Keys are `"{normalized title}_{year|any}"`. Expiry is checked lazily on
//! read; an expired entry reads as a miss and is only deleted by a later
//! purge. When a write pushes the entry count past capacity, expired
//! entries are purged first and the least recently accessed are evicted
//! until the bound holds again.
//!
//! Store failures never surface to callers: they are logged and treated
//! as misses (reads) or dropped (writes).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CacheStoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Other(String),
}

/// One persisted cache entry. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub access_count: u64,
}

/// Backing storage for [`MetadataCache`].
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError>;
    /// Insert or replace.
    async fn put(&self, entry: CacheEntry) -> Result<(), CacheStoreError>;
    /// Record a read hit at `now`.
    async fn touch(&self, key: &str, now: i64) -> Result<(), CacheStoreError>;
    async fn len(&self) -> Result<u64, CacheStoreError>;
    async fn count_created_before(&self, cutoff: i64) -> Result<u64, CacheStoreError>;
    /// Remove entries created at or before `cutoff`.
    async fn remove_created_before(&self, cutoff: i64) -> Result<u64, CacheStoreError>;
    /// Remove least recently accessed entries until at most `keep` remain.
    async fn evict_lru(&self, keep: u64) -> Result<u64, CacheStoreError>;
    async fn remove(&self, key: &str) -> Result<bool, CacheStoreError>;
    async fn clear(&self) -> Result<u64, CacheStoreError>;
}

/// In-process store. Used in tests and when no database path is configured.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheStoreError> {
        self.entries.lock().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn touch(&self, key: &str, now: i64) -> Result<(), CacheStoreError> {
        if let Some(entry) = self.entries.lock().await.get_mut(key) {
            entry.last_accessed_at = now;
            entry.access_count += 1;
        }
        Ok(())
    }

    async fn len(&self) -> Result<u64, CacheStoreError> {
        Ok(self.entries.lock().await.len() as u64)
    }

    async fn count_created_before(&self, cutoff: i64) -> Result<u64, CacheStoreError> {
        let entries = self.entries.lock().await;
        Ok(entries.values().filter(|e| e.created_at <= cutoff).count() as u64)
    }

    async fn remove_created_before(&self, cutoff: i64) -> Result<u64, CacheStoreError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.created_at > cutoff);
        Ok((before - entries.len()) as u64)
    }

    async fn evict_lru(&self, keep: u64) -> Result<u64, CacheStoreError> {
        let mut entries = self.entries.lock().await;
        let excess = (entries.len() as u64).saturating_sub(keep) as usize;
        if excess == 0 {
            return Ok(0);
        }
        let mut order: Vec<(i64, i64, String)> = entries
            .values()
            .map(|e| (e.last_accessed_at, e.created_at, e.key.clone()))
            .collect();
        order.sort();
        for (_, _, key) in order.into_iter().take(excess) {
            entries.remove(&key);
        }
        Ok(excess as u64)
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheStoreError> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }

    async fn clear(&self) -> Result<u64, CacheStoreError> {
        let mut entries = self.entries.lock().await;
        let n = entries.len() as u64;
        entries.clear();
        Ok(n)
    }
}

/// Lowercase, collapse internal whitespace, trim.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cache key for a title/year pair.
pub fn normalize_key(title: &str, year: Option<u16>) -> String {
    match year {
        Some(y) => format!("{}_{y}", normalize_title(title)),
        None => format!("{}_any", normalize_title(title)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: u64,
    /// Entries past their TTL that have not been purged yet.
    pub expired: u64,
    pub capacity: u64,
    pub ttl_secs: u64,
}

/// Source of "now" in unix milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub struct MetadataCache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    capacity: u64,
    clock: Clock,
    // Serializes read-check-write sequences against the store.
    guard: Mutex<()>,
}

impl MetadataCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, capacity: u64) -> Self {
        Self {
            store: Some(store),
            ttl,
            capacity,
            clock: Arc::new(|| chrono::Utc::now().timestamp_millis()),
            guard: Mutex::new(()),
        }
    }

    /// A cache that never stores anything; every read is a miss.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
            capacity: 0,
            clock: Arc::new(|| chrono::Utc::now().timestamp_millis()),
            guard: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        now.saturating_sub(entry.created_at) >= self.ttl_ms()
    }

    pub async fn get<T: DeserializeOwned>(&self, title: &str, year: Option<u16>) -> Option<T> {
        self.get_by_key(&normalize_key(title, year)).await
    }

    pub async fn put<T: Serialize>(&self, title: &str, year: Option<u16>, value: &T) {
        self.put_by_key(&normalize_key(title, year), value).await
    }

    /// Read an already-normalized key.
    pub async fn get_by_key<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        let _guard = self.guard.lock().await;
        let now = self.now();

        let entry = match store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                return None;
            }
        };
        if self.is_expired(&entry, now) {
            debug!(key, "cache entry expired");
            return None;
        }

        let value = match serde_json::from_str(&entry.payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "cache payload unreadable");
                return None;
            }
        };
        if let Err(e) = store.touch(key, now).await {
            warn!(key, error = %e, "cache touch failed");
        }
        debug!(key, "cache hit");
        Some(value)
    }

    /// Write an already-normalized key, enforcing the capacity bound.
    pub async fn put_by_key<T: Serialize>(&self, key: &str, value: &T) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(key, error = %e, "cache payload not serializable");
                return;
            }
        };

        let _guard = self.guard.lock().await;
        let now = self.now();
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
        };
        if let Err(e) = store.put(entry).await {
            warn!(key, error = %e, "cache write failed");
            return;
        }
        if let Err(e) = self.enforce_capacity(store.as_ref(), now).await {
            warn!(error = %e, "cache eviction failed");
        }
    }

    async fn enforce_capacity(&self, store: &dyn CacheStore, now: i64) -> Result<(), CacheStoreError> {
        if store.len().await? <= self.capacity {
            return Ok(());
        }
        let purged = store
            .remove_created_before(now.saturating_sub(self.ttl_ms()))
            .await?;
        let evicted = store.evict_lru(self.capacity).await?;
        debug!(purged, evicted, capacity = self.capacity, "cache over capacity");
        Ok(())
    }

    /// Remove entries older than `age`, regardless of TTL.
    pub async fn invalidate_older_than(&self, age: Duration) -> u64 {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        let _guard = self.guard.lock().await;
        let age_ms = i64::try_from(age.as_millis()).unwrap_or(i64::MAX);
        match store.remove_created_before(self.now().saturating_sub(age_ms)).await {
            Ok(n) => {
                info!(removed = n, "cache entries invalidated");
                n
            }
            Err(e) => {
                warn!(error = %e, "cache invalidation failed");
                0
            }
        }
    }

    pub async fn remove(&self, title: &str, year: Option<u16>) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let _guard = self.guard.lock().await;
        store
            .remove(&normalize_key(title, year))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "cache remove failed");
                false
            })
    }

    pub async fn clear(&self) -> u64 {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        let _guard = self.guard.lock().await;
        store.clear().await.unwrap_or_else(|e| {
            warn!(error = %e, "cache clear failed");
            0
        })
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            enabled: self.is_enabled(),
            entries: 0,
            expired: 0,
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
        };
        let Some(store) = self.store.as_ref() else {
            return stats;
        };
        let _guard = self.guard.lock().await;
        let cutoff = self.now().saturating_sub(self.ttl_ms());
        match (store.len().await, store.count_created_before(cutoff).await) {
            (Ok(entries), Ok(expired)) => {
                stats.entries = entries;
                stats.expired = expired;
            }
            (Err(e), _) | (_, Err(e)) => warn!(error = %e, "cache stats unavailable"),
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        id: u32,
    }

    fn manual_clock() -> (Arc<AtomicI64>, Clock) {
        let now = Arc::new(AtomicI64::new(1_000_000));
        let handle = now.clone();
        (now, Arc::new(move || handle.load(Ordering::SeqCst)))
    }

    fn cache(ttl: Duration, capacity: u64) -> (Arc<AtomicI64>, MetadataCache) {
        let (now, clock) = manual_clock();
        let cache = MetadataCache::new(Arc::new(MemoryCacheStore::new()), ttl, capacity)
            .with_clock(clock);
        (now, cache)
    }

    #[test]
    fn key_normalization() {
        assert_eq!(normalize_key("  Attack   on Titan ", Some(2013)), "attack on titan_2013");
        assert_eq!(normalize_key("Attack on Titan", None), "attack on titan_any");
        assert_eq!(
            normalize_key("ATTACK ON TITAN", Some(2013)),
            normalize_key("attack on titan", Some(2013))
        );

        let once = normalize_title("  Mob\tPsycho  100 ");
        assert_eq!(normalize_title(&once), once);
    }

    #[tokio::test]
    async fn put_then_get_is_case_and_space_insensitive() {
        let (_, cache) = cache(Duration::from_secs(60), 10);
        cache.put("Attack on Titan", Some(2013), &Payload { id: 1429 }).await;

        let hit: Option<Payload> = cache.get("attack  on TITAN", Some(2013)).await;
        assert_eq!(hit, Some(Payload { id: 1429 }));
        let other_year: Option<Payload> = cache.get("Attack on Titan", None).await;
        assert_eq!(other_year, None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let (now, cache) = cache(Duration::from_secs(60), 10);
        cache.put("Show", None, &Payload { id: 1 }).await;

        now.fetch_add(59_999, Ordering::SeqCst);
        assert!(cache.get::<Payload>("Show", None).await.is_some());

        now.fetch_add(1, Ordering::SeqCst);
        assert!(cache.get::<Payload>("Show", None).await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.expired, 1);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_accessed() {
        let (now, cache) = cache(Duration::from_secs(3600), 2);
        cache.put("a", None, &Payload { id: 1 }).await;
        now.fetch_add(10, Ordering::SeqCst);
        cache.put("b", None, &Payload { id: 2 }).await;
        now.fetch_add(10, Ordering::SeqCst);
        assert!(cache.get::<Payload>("a", None).await.is_some());
        now.fetch_add(10, Ordering::SeqCst);
        cache.put("c", None, &Payload { id: 3 }).await;

        assert_eq!(cache.stats().await.entries, 2);
        assert!(cache.get::<Payload>("b", None).await.is_none());
        assert!(cache.get::<Payload>("a", None).await.is_some());
        assert!(cache.get::<Payload>("c", None).await.is_some());
    }

    #[tokio::test]
    async fn over_capacity_purges_expired_before_evicting() {
        let (now, cache) = cache(Duration::from_secs(1), 2);
        cache.put("stale", None, &Payload { id: 1 }).await;
        now.fetch_add(500, Ordering::SeqCst);
        cache.put("fresh", None, &Payload { id: 2 }).await;
        now.fetch_add(100, Ordering::SeqCst);
        // "stale" is now the most recently accessed entry.
        assert!(cache.get::<Payload>("stale", None).await.is_some());
        now.fetch_add(600, Ordering::SeqCst);
        cache.put("newest", None, &Payload { id: 3 }).await;

        assert!(cache.get::<Payload>("fresh", None).await.is_some());
        assert!(cache.get::<Payload>("newest", None).await.is_some());
        assert_eq!(cache.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn invalidate_remove_clear() {
        let (now, cache) = cache(Duration::from_secs(3600), 10);
        cache.put("old", None, &Payload { id: 1 }).await;
        now.fetch_add(5_000, Ordering::SeqCst);
        cache.put("new", None, &Payload { id: 2 }).await;

        assert_eq!(cache.invalidate_older_than(Duration::from_secs(2)).await, 1);
        assert!(cache.get::<Payload>("old", None).await.is_none());
        assert!(cache.remove("NEW", None).await);
        assert!(!cache.remove("new", None).await);

        cache.put("x", Some(2020), &Payload { id: 3 }).await;
        assert_eq!(cache.clear().await, 1);
    }

    #[tokio::test]
    async fn disabled_cache_is_always_a_miss() {
        let cache = MetadataCache::disabled();
        cache.put("Show", None, &Payload { id: 1 }).await;
        assert!(cache.get::<Payload>("Show", None).await.is_none());
        let stats = cache.stats().await;
        assert!(!stats.enabled);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn unreadable_payload_is_a_miss() {
        let (_, cache) = cache(Duration::from_secs(60), 10);
        cache.put("Show", None, &"just a string").await;
        assert!(cache.get::<Payload>("Show", None).await.is_none());
    }
}
