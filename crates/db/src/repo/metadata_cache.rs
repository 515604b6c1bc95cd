use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRow {
    pub key: String,
    pub payload: String,
    pub created_ts: i64,
    pub last_accessed_ts: i64,
    pub access_count: i64,
}

/// Fetch a cache row by key. Does not touch access bookkeeping.
pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<CacheRow>, sqlx::Error> {
    let row: Option<(String, String, i64, i64, i64)> = sqlx::query_as(
        "SELECT key, payload, created_ts, last_accessed_ts, access_count \
         FROM metadata_cache WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(key, payload, created_ts, last_accessed_ts, access_count)| CacheRow {
            key,
            payload,
            created_ts,
            last_accessed_ts,
            access_count,
        },
    ))
}

/// Insert or replace a cache row. Replacing resets the creation time.
pub async fn upsert(pool: &SqlitePool, row: &CacheRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO metadata_cache (key, payload, created_ts, last_accessed_ts, access_count) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET \
         payload = excluded.payload, \
         created_ts = excluded.created_ts, \
         last_accessed_ts = excluded.last_accessed_ts, \
         access_count = excluded.access_count",
    )
    .bind(&row.key)
    .bind(&row.payload)
    .bind(row.created_ts)
    .bind(row.last_accessed_ts)
    .bind(row.access_count)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a read hit.
pub async fn touch(pool: &SqlitePool, key: &str, now_ts: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE metadata_cache SET last_accessed_ts = ?, access_count = access_count + 1 \
         WHERE key = ?",
    )
    .bind(now_ts)
    .bind(key)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metadata_cache")
        .fetch_one(pool)
        .await?;
    Ok(n.max(0) as u64)
}

pub async fn count_created_before(pool: &SqlitePool, cutoff_ts: i64) -> Result<u64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metadata_cache WHERE created_ts <= ?")
        .bind(cutoff_ts)
        .fetch_one(pool)
        .await?;
    Ok(n.max(0) as u64)
}

/// Delete rows created at or before `cutoff_ts`. Returns rows removed.
pub async fn delete_created_before(pool: &SqlitePool, cutoff_ts: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM metadata_cache WHERE created_ts <= ?")
        .bind(cutoff_ts)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete least-recently-accessed rows until at most `keep` remain.
pub async fn evict_lru(pool: &SqlitePool, keep: u64) -> Result<u64, sqlx::Error> {
    let total = count(pool).await?;
    if total <= keep {
        return Ok(0);
    }
    let excess = (total - keep) as i64;
    let result = sqlx::query(
        "DELETE FROM metadata_cache WHERE key IN ( \
         SELECT key FROM metadata_cache ORDER BY last_accessed_ts ASC, created_ts ASC LIMIT ?)",
    )
    .bind(excess)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete(pool: &SqlitePool, key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM metadata_cache WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_all(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM metadata_cache").execute(pool).await?;
    Ok(result.rows_affected())
}
