//! Remote response cache and politeness-gate state (C8).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{RemoteCacheEntry, RemoteRuntimeState};

pub async fn get_cached_feed(
    pool: &SqlitePool,
    service: &str,
    query_fingerprint: &str,
    now: DateTime<Utc>,
) -> Result<Option<RemoteCacheEntry>, sqlx::Error> {
    sqlx::query_as::<_, RemoteCacheEntry>(
        "SELECT service, query_fingerprint, payload, expires_at, cached_at FROM remote_cache_entries \
         WHERE service = ? AND query_fingerprint = ? AND expires_at > ?",
    )
    .bind(service)
    .bind(query_fingerprint)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn set_cached_feed(
    pool: &SqlitePool,
    service: &str,
    query_fingerprint: &str,
    payload: &str,
    expires_at: DateTime<Utc>,
    cached_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO remote_cache_entries (service, query_fingerprint, payload, expires_at, cached_at) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (service, query_fingerprint) DO UPDATE SET \
           payload = excluded.payload, expires_at = excluded.expires_at, cached_at = excluded.cached_at",
    )
    .bind(service)
    .bind(query_fingerprint)
    .bind(payload)
    .bind(expires_at)
    .bind(cached_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// LRU-style eviction down to `keep_most_recent` entries per service, run
/// opportunistically rather than on every write.
pub async fn evict_oldest(pool: &SqlitePool, service: &str, keep_most_recent: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM remote_cache_entries WHERE service = ? AND query_fingerprint NOT IN ( \
           SELECT query_fingerprint FROM remote_cache_entries WHERE service = ? \
           ORDER BY cached_at DESC LIMIT ? \
         )",
    )
    .bind(service)
    .bind(service)
    .bind(keep_most_recent)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn get_runtime_state(
    pool: &SqlitePool,
    service: &str,
    state_key: &str,
) -> Result<Option<RemoteRuntimeState>, sqlx::Error> {
    sqlx::query_as::<_, RemoteRuntimeState>(
        "SELECT service, state_key, next_allowed_at, cooldown_until, consecutive_blocked_count \
         FROM remote_runtime_state WHERE service = ? AND state_key = ?",
    )
    .bind(service)
    .bind(state_key)
    .fetch_optional(pool)
    .await
}

pub async fn set_next_allowed_at(
    pool: &SqlitePool,
    service: &str,
    state_key: &str,
    next_allowed_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO remote_runtime_state (service, state_key, next_allowed_at) VALUES (?, ?, ?) \
         ON CONFLICT (service, state_key) DO UPDATE SET next_allowed_at = excluded.next_allowed_at",
    )
    .bind(service)
    .bind(state_key)
    .bind(next_allowed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_cooldown(
    pool: &SqlitePool,
    service: &str,
    state_key: &str,
    cooldown_until: Option<DateTime<Utc>>,
    consecutive_blocked_count: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO remote_runtime_state (service, state_key, cooldown_until, consecutive_blocked_count) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (service, state_key) DO UPDATE SET \
           cooldown_until = excluded.cooldown_until, \
           consecutive_blocked_count = excluded.consecutive_blocked_count",
    )
    .bind(service)
    .bind(state_key)
    .bind(cooldown_until)
    .bind(consecutive_blocked_count)
    .execute(pool)
    .await?;
    Ok(())
}
