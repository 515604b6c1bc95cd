use mediasort_db::repo::metadata_cache::{self, CacheRow};
use sqlx::SqlitePool;

use crate::cache::{CacheEntry, CacheStore, CacheStoreError};

/// [`CacheStore`] persisted in the `metadata_cache` table.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    /// The pool must already have migrations applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl From<CacheRow> for CacheEntry {
    fn from(row: CacheRow) -> Self {
        Self {
            key: row.key,
            payload: row.payload,
            created_at: row.created_ts,
            last_accessed_at: row.last_accessed_ts,
            access_count: row.access_count.max(0) as u64,
        }
    }
}

#[async_trait::async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        Ok(metadata_cache::get(&self.pool, key).await?.map(CacheEntry::from))
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheStoreError> {
        let row = CacheRow {
            key: entry.key,
            payload: entry.payload,
            created_ts: entry.created_at,
            last_accessed_ts: entry.last_accessed_at,
            access_count: i64::try_from(entry.access_count).unwrap_or(i64::MAX),
        };
        Ok(metadata_cache::upsert(&self.pool, &row).await?)
    }

    async fn touch(&self, key: &str, now: i64) -> Result<(), CacheStoreError> {
        Ok(metadata_cache::touch(&self.pool, key, now).await?)
    }

    async fn len(&self) -> Result<u64, CacheStoreError> {
        Ok(metadata_cache::count(&self.pool).await?)
    }

    async fn count_created_before(&self, cutoff: i64) -> Result<u64, CacheStoreError> {
        Ok(metadata_cache::count_created_before(&self.pool, cutoff).await?)
    }

    async fn remove_created_before(&self, cutoff: i64) -> Result<u64, CacheStoreError> {
        Ok(metadata_cache::delete_created_before(&self.pool, cutoff).await?)
    }

    async fn evict_lru(&self, keep: u64) -> Result<u64, CacheStoreError> {
        Ok(metadata_cache::evict_lru(&self.pool, keep).await?)
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheStoreError> {
        Ok(metadata_cache::delete(&self.pool, key).await?)
    }

    async fn clear(&self) -> Result<u64, CacheStoreError> {
        Ok(metadata_cache::delete_all(&self.pool).await?)
    }
}
