//! TTL-backed remote response cache (C8), wrapping [`crate::db::cache`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

const FINGERPRINT_VERSION_PREFIX: &str = "v1";

/// Canonicalize query params the way the remote services normalize them,
/// then SHA-256 the result salted with a version prefix so a future
/// normalization change invalidates old entries automatically.
#[must_use]
pub fn build_query_fingerprint(params: &Value) -> String {
    let normalized = normalize_params(params);
    let canonical = serde_json::to_string(&normalized).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION_PREFIX.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_params(params: &Value) -> Value {
    let Value::Object(map) = params else {
        return params.clone();
    };
    let mut out = serde_json::Map::new();
    for (key, value) in map {
        let normalized = match key.as_str() {
            "search_query" => Value::String(collapse_whitespace(&value.as_str().unwrap_or_default().to_lowercase())),
            "id_list" => {
                let mut ids: Vec<String> = value
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str())
                            .map(|s| collapse_whitespace(&s.to_lowercase()))
                            .collect()
                    })
                    .unwrap_or_default();
                ids.sort();
                Value::String(ids.join(","))
            }
            _ => match value {
                Value::String(s) => Value::String(collapse_whitespace(s)),
                other => other.clone(),
            },
        };
        out.insert(key.clone(), normalized);
    }
    Value::Object(out)
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub async fn get_cached_feed(
    pool: &SqlitePool,
    service: &str,
    query_fingerprint: &str,
    now: DateTime<Utc>,
) -> Result<Option<String>, sqlx::Error> {
    Ok(crate::db::cache::get_cached_feed(pool, service, query_fingerprint, now)
        .await?
        .map(|entry| entry.payload))
}

pub async fn set_cached_feed(
    pool: &SqlitePool,
    service: &str,
    query_fingerprint: &str,
    payload: &str,
    ttl_seconds: i64,
    max_entries: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    if ttl_seconds <= 0 {
        sqlx::query("DELETE FROM remote_cache_entries WHERE service = ? AND query_fingerprint = ?")
            .bind(service)
            .bind(query_fingerprint)
            .execute(pool)
            .await?;
        return Ok(());
    }
    let expires_at = now + chrono::Duration::seconds(ttl_seconds);
    crate::db::cache::set_cached_feed(pool, service, query_fingerprint, payload, expires_at, now).await?;
    crate::db::cache::evict_oldest(pool, service, max_entries).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_stable_for_equivalent_params() {
        let a = build_query_fingerprint(&json!({"search_query": "  Deep   Learning  "}));
        let b = build_query_fingerprint(&json!({"search_query": "deep learning"}));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_sorts_id_list() {
        let a = build_query_fingerprint(&json!({"id_list": ["b", "a"]}));
        let b = build_query_fingerprint(&json!({"id_list": ["a", "b"]}));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_for_different_queries() {
        let a = build_query_fingerprint(&json!({"search_query": "alpha"}));
        let b = build_query_fingerprint(&json!({"search_query": "beta"}));
        assert_ne!(a, b);
    }
}
