//! Continuation Queue (C6): logic layer over [`crate::db::queue`] —
//! backoff computation and drop conditions.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::QueueItem;
use crate::db::queue;
use crate::error::QueueError;

/// `min(base * 2^(attempt-1), max_seconds)`, with `base >= 1`, `attempt >= 1`.
#[must_use]
pub fn compute_backoff_seconds(base_seconds: u64, attempt: u32, max_seconds: u64) -> u64 {
    let base = base_seconds.max(1);
    let attempt = attempt.max(1);
    let max_seconds = max_seconds.max(base);
    base.saturating_mul(1u64 << (attempt - 1).min(62)).min(max_seconds)
}

/// Upsert a job for a scholar that needs to resume from `resume_cstart`.
pub async fn upsert_job(
    pool: &SqlitePool,
    user_id: i64,
    scholar_profile_id: i64,
    resume_cstart: i64,
    reason: &str,
    delay_seconds: u64,
    now: DateTime<Utc>,
) -> Result<(), QueueError> {
    let next_attempt_dt = now + chrono::Duration::seconds(delay_seconds as i64);
    queue::upsert_job(pool, user_id, scholar_profile_id, resume_cstart, reason, next_attempt_dt).await?;
    Ok(())
}

pub async fn clear_job_for_scholar(pool: &SqlitePool, scholar_profile_id: i64) -> Result<(), QueueError> {
    queue::clear_job_for_scholar(pool, scholar_profile_id).await?;
    Ok(())
}

/// Jobs ready for dispatch, per C10's drain.
pub async fn list_due_jobs(pool: &SqlitePool, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueueItem>, QueueError> {
    Ok(queue::list_due_jobs(pool, now, limit).await?)
}

/// A job is dropped (terminal) when its attempt count reaches
/// `continuation_max_attempts` before dispatch.
#[must_use]
pub fn should_drop_before_dispatch(job: &QueueItem, max_attempts: u32) -> bool {
    job.attempt_count >= i64::from(max_attempts)
}

pub async fn mark_dropped(pool: &SqlitePool, job_id: i64, reason: &str, at: DateTime<Utc>) -> Result<(), QueueError> {
    queue::mark_dropped(pool, job_id, reason, at).await?;
    Ok(())
}

/// Reschedule a job after a failed dispatch attempt, dropping it if the new
/// attempt count has reached the max.
pub async fn reschedule_job(
    pool: &SqlitePool,
    job: &QueueItem,
    base_seconds: u64,
    max_seconds: u64,
    max_attempts: u32,
    last_run_id: Option<i64>,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), QueueError> {
    let attempt_count = queue::increment_attempt_count(pool, job.id).await?;
    if attempt_count >= i64::from(max_attempts) {
        queue::mark_dropped(pool, job.id, "retry_exhausted", now).await?;
        return Ok(());
    }
    let delay = compute_backoff_seconds(base_seconds, attempt_count as u32, max_seconds);
    let next_attempt_dt = now + chrono::Duration::seconds(delay as i64);
    queue::mark_retrying(pool, job.id, next_attempt_dt, last_run_id, error).await?;
    Ok(())
}

/// A dispatched job completed cleanly: clear it or reset its attempt counter.
pub async fn mark_succeeded(pool: &SqlitePool, job_id: i64) -> Result<(), QueueError> {
    queue::delete_job_by_id(pool, job_id).await?;
    Ok(())
}

pub async fn reset_attempt_count(pool: &SqlitePool, job_id: i64) -> Result<(), QueueError> {
    queue::reset_attempt_count(pool, job_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(compute_backoff_seconds(10, 1, 1000), 10);
        assert_eq!(compute_backoff_seconds(10, 2, 1000), 20);
        assert_eq!(compute_backoff_seconds(10, 3, 1000), 40);
        assert_eq!(compute_backoff_seconds(10, 20, 500), 500);
    }

    #[test]
    fn backoff_enforces_minimum_base() {
        assert_eq!(compute_backoff_seconds(0, 1, 100), 1);
    }

    #[test]
    fn backoff_is_monotone_in_attempt() {
        let mut previous = 0;
        for attempt in 1..10 {
            let value = compute_backoff_seconds(5, attempt, 3600);
            assert!(value >= previous);
            previous = value;
        }
    }
}
