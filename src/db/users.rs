//! User and `UserSettings` repository functions.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::UserSettings;

/// Load a user's settings, creating a default row if this is their first access.
pub async fn get_or_create_settings(pool: &SqlitePool, user_id: i64) -> Result<UserSettings, sqlx::Error> {
    if let Some(settings) = sqlx::query_as::<_, UserSettings>(
        "SELECT user_id, auto_run_enabled, run_interval_minutes, request_delay_seconds, \
         nav_visible_pages, scrape_safety_state, scrape_cooldown_until, scrape_cooldown_reason, \
         openalex_api_key, crossref_api_mailto, last_run_start \
         FROM user_settings WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    {
        return Ok(settings);
    }

    sqlx::query("INSERT OR IGNORE INTO user_settings (user_id) VALUES (?)")
        .bind(user_id)
        .execute(pool)
        .await?;

    sqlx::query_as::<_, UserSettings>(
        "SELECT user_id, auto_run_enabled, run_interval_minutes, request_delay_seconds, \
         nav_visible_pages, scrape_safety_state, scrape_cooldown_until, scrape_cooldown_reason, \
         openalex_api_key, crossref_api_mailto, last_run_start \
         FROM user_settings WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn update_safety_state(
    pool: &SqlitePool,
    user_id: i64,
    state_json: &str,
    cooldown_until: Option<DateTime<Utc>>,
    cooldown_reason: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE user_settings SET scrape_safety_state = ?, scrape_cooldown_until = ?, \
         scrape_cooldown_reason = ? WHERE user_id = ?",
    )
    .bind(state_json)
    .bind(cooldown_until)
    .bind(cooldown_reason)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_run_start(pool: &SqlitePool, user_id: i64, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE user_settings SET last_run_start = ? WHERE user_id = ?")
        .bind(at)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Users whose auto-run schedule is due, per C10's `now - last_run_start >= run_interval_minutes`.
pub async fn list_due_for_scheduled_run(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT user_id FROM user_settings \
         WHERE auto_run_enabled = 1 \
           AND (last_run_start IS NULL \
                OR (julianday(?) - julianday(last_run_start)) * 1440.0 >= run_interval_minutes)",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
