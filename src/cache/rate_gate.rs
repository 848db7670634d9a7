//! Politeness gates (C8): a per-service fail-fast cooldown gate for remote
//! APIs (arXiv, OpenAlex), and a distinct serialized minimum-interval gate
//! for Google Scholar itself.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::CacheError;

/// Persisted per-service rate limiter. Scholar access is inherently
/// single-stream per process, but remote services (arXiv, OpenAlex) tolerate
/// concurrent callers racing for a slot, so this fails fast on cooldown
/// rather than serializing every caller behind a queue.
pub struct RemoteServiceGate {
    pub service: &'static str,
    pub min_interval_seconds: i64,
    pub blocked_threshold: u32,
    pub cooldown_seconds: i64,
}

const GLOBAL_STATE_KEY: &str = "global";

impl RemoteServiceGate {
    /// Check the service cooldown and the minimum-interval slot. Returns
    /// `Err(CacheError::CooldownActive)` fast if a blocked-response cooldown
    /// is active; otherwise reserves the next slot and returns.
    pub async fn reserve_slot(&self, pool: &SqlitePool, now: DateTime<Utc>) -> Result<(), CacheError> {
        let state = crate::db::cache::get_runtime_state(pool, self.service, GLOBAL_STATE_KEY).await?;

        if let Some(state) = &state {
            if let Some(cooldown_until) = state.cooldown_until {
                if cooldown_until > now {
                    return Err(CacheError::CooldownActive {
                        retry_after_seconds: (cooldown_until - now).num_seconds().max(0),
                    });
                }
            }
        }

        let next_allowed_at = now + chrono::Duration::seconds(self.min_interval_seconds);
        crate::db::cache::set_next_allowed_at(pool, self.service, GLOBAL_STATE_KEY, next_allowed_at).await?;
        Ok(())
    }

    /// Record a blocked/rate-limited response; activates a cooldown once
    /// `blocked_threshold` consecutive blocked responses are seen.
    pub async fn register_blocked_response(&self, pool: &SqlitePool, now: DateTime<Utc>) -> Result<(), CacheError> {
        let state = crate::db::cache::get_runtime_state(pool, self.service, GLOBAL_STATE_KEY).await?;
        let consecutive = state.as_ref().map_or(0, |s| s.consecutive_blocked_count) + 1;

        let cooldown_until = if consecutive >= i64::from(self.blocked_threshold) {
            Some(now + chrono::Duration::seconds(self.cooldown_seconds))
        } else {
            None
        };

        crate::db::cache::set_cooldown(pool, self.service, GLOBAL_STATE_KEY, cooldown_until, consecutive).await?;
        Ok(())
    }

    pub async fn register_success(&self, pool: &SqlitePool) -> Result<(), CacheError> {
        crate::db::cache::set_cooldown(pool, self.service, GLOBAL_STATE_KEY, None, 0).await?;
        Ok(())
    }
}

/// In-process serialized minimum-interval gate for Google Scholar. Unlike
/// [`RemoteServiceGate`], every caller awaits its turn rather than failing
/// fast — Scholar access is single-stream per process.
pub struct ScholarSlotGate {
    min_interval: std::time::Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ScholarSlotGate {
    #[must_use]
    pub fn new(min_interval: std::time::Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Block until it is this caller's turn, then reserve the slot.
    pub async fn wait_for_scholar_slot(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn scholar_slot_gate_serializes_callers() {
        let gate = Arc::new(ScholarSlotGate::new(Duration::from_millis(30)));
        let start = Instant::now();
        gate.wait_for_scholar_slot().await;
        gate.wait_for_scholar_slot().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
