//! `ScholarProfile` repository functions.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::ScholarProfile;

const COLUMNS: &str = "id, user_id, scholar_id, display_name, profile_image_url, \
    profile_image_override_url, profile_image_upload_path, is_enabled, baseline_completed, \
    last_run_dt, last_run_status, last_initial_page_fingerprint_sha256, last_initial_page_checked_at";

/// Enabled scholars for a user, ordered `(created_at, id)` per §5's ordering guarantee.
pub async fn list_enabled(pool: &SqlitePool, user_id: i64) -> Result<Vec<ScholarProfile>, sqlx::Error> {
    sqlx::query_as::<_, ScholarProfile>(&format!(
        "SELECT {COLUMNS} FROM scholar_profiles WHERE user_id = ? AND is_enabled = 1 \
         ORDER BY created_at, id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn get(pool: &SqlitePool, scholar_profile_id: i64) -> Result<Option<ScholarProfile>, sqlx::Error> {
    sqlx::query_as::<_, ScholarProfile>(&format!(
        "SELECT {COLUMNS} FROM scholar_profiles WHERE id = ?"
    ))
    .bind(scholar_profile_id)
    .fetch_optional(pool)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn apply_profile_metadata(
    pool: &SqlitePool,
    scholar_profile_id: i64,
    display_name: Option<&str>,
    profile_image_url: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE scholar_profiles SET \
           display_name = COALESCE(display_name, ?), \
           profile_image_url = COALESCE(?, profile_image_url) \
         WHERE id = ?",
    )
    .bind(display_name)
    .bind(profile_image_url)
    .bind(scholar_profile_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_run_outcome(
    pool: &SqlitePool,
    scholar_profile_id: i64,
    status: &str,
    run_dt: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE scholar_profiles SET last_run_status = ?, last_run_dt = ?, baseline_completed = 1 \
         WHERE id = ?",
    )
    .bind(status)
    .bind(run_dt)
    .bind(scholar_profile_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Only a non-partial outcome with a defined fingerprint may overwrite the
/// stored initial-page fingerprint (Testable Property 6).
pub async fn persist_initial_page_fingerprint(
    pool: &SqlitePool,
    scholar_profile_id: i64,
    fingerprint_sha256: &str,
    checked_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE scholar_profiles SET last_initial_page_fingerprint_sha256 = ?, \
         last_initial_page_checked_at = ? WHERE id = ?",
    )
    .bind(fingerprint_sha256)
    .bind(checked_at)
    .bind(scholar_profile_id)
    .execute(pool)
    .await?;
    Ok(())
}
