//! `CrawlRun` repository functions (run-record lifecycle for C5).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{CrawlRun, CrawlRunRow, RunStatus, TriggerType};

const COLUMNS: &str = "id, user_id, trigger_type, status, start_dt, end_dt, scholar_count, \
    new_pub_count, idempotency_key, error_log";

/// Raised when an idempotency key collides with an existing run for the same user.
#[derive(Debug, thiserror::Error)]
pub enum CreateRunError {
    #[error("a run with this idempotency key already exists")]
    IdempotencyConflict { existing_run_id: i64 },
    #[error("user already has an active run")]
    AlreadyActive { existing_run_id: i64 },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Create a new run in `running` status. The partial unique indexes on
/// `crawl_runs` make the races this guards against impossible to observe as
/// two live rows; this still classifies the conflict so the caller can return
/// a useful error rather than a raw constraint violation.
pub async fn create(
    pool: &SqlitePool,
    user_id: i64,
    trigger_type: TriggerType,
    start_dt: DateTime<Utc>,
    idempotency_key: Option<&str>,
) -> Result<CrawlRun, CreateRunError> {
    if let Some(key) = idempotency_key {
        if let Some(existing) = sqlx::query_as::<_, CrawlRunRow>(&format!(
            "SELECT {COLUMNS} FROM crawl_runs WHERE user_id = ? AND idempotency_key = ?"
        ))
        .bind(user_id)
        .bind(key)
        .fetch_optional(pool)
        .await?
        {
            return Err(CreateRunError::IdempotencyConflict {
                existing_run_id: existing.id,
            });
        }
    }

    if let Some(existing) = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {COLUMNS} FROM crawl_runs WHERE user_id = ? AND status IN ('running', 'resolving')"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    {
        return Err(CreateRunError::AlreadyActive {
            existing_run_id: existing.id,
        });
    }

    let result = sqlx::query(
        "INSERT INTO crawl_runs (user_id, trigger_type, status, start_dt, idempotency_key) \
         VALUES (?, ?, 'running', ?, ?)",
    )
    .bind(user_id)
    .bind(trigger_type.as_str())
    .bind(start_dt)
    .bind(idempotency_key)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    get(pool, id)
        .await?
        .ok_or_else(|| CreateRunError::Db(sqlx::Error::RowNotFound))
}

pub async fn get(pool: &SqlitePool, run_id: i64) -> Result<Option<CrawlRun>, sqlx::Error> {
    let row = sqlx::query_as::<_, CrawlRunRow>(&format!("SELECT {COLUMNS} FROM crawl_runs WHERE id = ?"))
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(CrawlRun::from))
}

pub async fn transition_to_resolving(pool: &SqlitePool, run_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE crawl_runs SET status = 'resolving' WHERE id = ? AND status = 'running'")
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn finish(
    pool: &SqlitePool,
    run_id: i64,
    status: RunStatus,
    end_dt: DateTime<Utc>,
    scholar_count: i64,
    new_pub_count: i64,
    error_log: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE crawl_runs SET status = ?, end_dt = ?, scholar_count = ?, new_pub_count = ?, \
         error_log = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(end_dt)
    .bind(scholar_count)
    .bind(new_pub_count)
    .bind(error_log)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Cooperative cancellation: flips an active run straight to `canceled`.
/// Returns `false` if the run was already terminal.
pub async fn cancel(pool: &SqlitePool, run_id: i64, end_dt: DateTime<Utc>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE crawl_runs SET status = 'canceled', end_dt = ? \
         WHERE id = ? AND status IN ('running', 'resolving')",
    )
    .bind(end_dt)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn is_cancel_requested(pool: &SqlitePool, run_id: i64) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM crawl_runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(status,)| status == "canceled").unwrap_or(true))
}

pub async fn get_active_for_user(pool: &SqlitePool, user_id: i64) -> Result<Option<CrawlRun>, sqlx::Error> {
    let row = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {COLUMNS} FROM crawl_runs WHERE user_id = ? AND status IN ('running', 'resolving')"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(CrawlRun::from))
}

pub async fn list_recent_for_user(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<CrawlRun>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {COLUMNS} FROM crawl_runs WHERE user_id = ? ORDER BY start_dt DESC, id DESC LIMIT ?"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(CrawlRun::from).collect())
}
