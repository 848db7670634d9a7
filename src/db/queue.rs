//! Continuation-queue repository functions (C6).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{QueueItem, QueueItemRow};

const COLUMNS: &str = "id, user_id, scholar_profile_id, resume_cstart, reason, status, \
    attempt_count, next_attempt_dt, last_run_id, last_error, dropped_reason, dropped_at";

/// Create or replace the pending job for a scholar. One job per scholar is
/// enforced by `(user_id, scholar_profile_id)` uniqueness; a newer reason
/// always supersedes an older queued one.
pub async fn upsert_job(
    pool: &SqlitePool,
    user_id: i64,
    scholar_profile_id: i64,
    resume_cstart: i64,
    reason: &str,
    next_attempt_dt: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO ingestion_queue_items \
           (user_id, scholar_profile_id, resume_cstart, reason, status, next_attempt_dt) \
         VALUES (?, ?, ?, ?, 'queued', ?) \
         ON CONFLICT (user_id, scholar_profile_id) DO UPDATE SET \
           resume_cstart = excluded.resume_cstart, \
           reason = excluded.reason, \
           status = 'queued', \
           next_attempt_dt = excluded.next_attempt_dt, \
           last_error = NULL, \
           dropped_reason = NULL, \
           dropped_at = NULL",
    )
    .bind(user_id)
    .bind(scholar_profile_id)
    .bind(resume_cstart)
    .bind(reason)
    .bind(next_attempt_dt)
    .execute(pool)
    .await?;
    Ok(())
}

/// Clear a scholar's job after it completes cleanly (no continuation needed).
pub async fn clear_job_for_scholar(pool: &SqlitePool, scholar_profile_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM ingestion_queue_items WHERE scholar_profile_id = ?")
        .bind(scholar_profile_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_job_by_id(pool: &SqlitePool, job_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM ingestion_queue_items WHERE id = ?")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, job_id: i64) -> Result<Option<QueueItem>, sqlx::Error> {
    let row = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {COLUMNS} FROM ingestion_queue_items WHERE id = ?"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(QueueItem::from))
}

/// Jobs ready for retry, in `(next_attempt_dt, id)` order, per C10's drain.
pub async fn list_due_jobs(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<QueueItem>, sqlx::Error> {
    let rows = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {COLUMNS} FROM ingestion_queue_items \
         WHERE status IN ('queued', 'retrying') AND next_attempt_dt <= ? \
         ORDER BY next_attempt_dt, id LIMIT ?"
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(QueueItem::from).collect())
}

pub async fn increment_attempt_count(pool: &SqlitePool, job_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query("UPDATE ingestion_queue_items SET attempt_count = attempt_count + 1 WHERE id = ?")
        .bind(job_id)
        .execute(pool)
        .await?;
    let row: (i64,) = sqlx::query_as("SELECT attempt_count FROM ingestion_queue_items WHERE id = ?")
        .bind(job_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn reset_attempt_count(pool: &SqlitePool, job_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE ingestion_queue_items SET attempt_count = 0 WHERE id = ?")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_retrying(
    pool: &SqlitePool,
    job_id: i64,
    next_attempt_dt: DateTime<Utc>,
    last_run_id: Option<i64>,
    last_error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE ingestion_queue_items SET status = 'retrying', next_attempt_dt = ?, \
         last_run_id = ?, last_error = ? WHERE id = ?",
    )
    .bind(next_attempt_dt)
    .bind(last_run_id)
    .bind(last_error)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_dropped(pool: &SqlitePool, job_id: i64, reason: &str, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE ingestion_queue_items SET status = 'dropped', dropped_reason = ?, dropped_at = ? \
         WHERE id = ?",
    )
    .bind(reason)
    .bind(at)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_queued_now(pool: &SqlitePool, job_id: i64, now: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE ingestion_queue_items SET status = 'queued', next_attempt_dt = ? WHERE id = ?",
    )
    .bind(now)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn reschedule_job(pool: &SqlitePool, job_id: i64, next_attempt_dt: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE ingestion_queue_items SET next_attempt_dt = ? WHERE id = ?")
        .bind(next_attempt_dt)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_for_scholar(pool: &SqlitePool, scholar_profile_id: i64) -> Result<Option<QueueItem>, sqlx::Error> {
    let row = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {COLUMNS} FROM ingestion_queue_items WHERE scholar_profile_id = ?"
    ))
    .bind(scholar_profile_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(QueueItem::from))
}
