//! Row types returned by the repository functions in sibling modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSettings {
    pub user_id: i64,
    pub auto_run_enabled: bool,
    pub run_interval_minutes: i64,
    pub request_delay_seconds: i64,
    pub nav_visible_pages: String,
    pub scrape_safety_state: String,
    pub scrape_cooldown_until: Option<DateTime<Utc>>,
    pub scrape_cooldown_reason: Option<String>,
    pub openalex_api_key: Option<String>,
    pub crossref_api_mailto: Option<String>,
    pub last_run_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScholarProfile {
    pub id: i64,
    pub user_id: i64,
    pub scholar_id: String,
    pub display_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub profile_image_override_url: Option<String>,
    pub profile_image_upload_path: Option<String>,
    pub is_enabled: bool,
    pub baseline_completed: bool,
    pub last_run_dt: Option<DateTime<Utc>>,
    pub last_run_status: Option<String>,
    pub last_initial_page_fingerprint_sha256: Option<String>,
    pub last_initial_page_checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Publication {
    pub id: i64,
    pub cluster_id: Option<String>,
    pub fingerprint_sha256: String,
    pub canonical_title_hash: String,
    pub doi: Option<String>,
    pub title_raw: String,
    pub title_normalized: String,
    pub year: Option<i64>,
    pub citation_count: i64,
    pub author_text: Option<String>,
    pub venue_text: Option<String>,
    pub pub_url: Option<String>,
    pub pdf_url: Option<String>,
    pub openalex_enriched: bool,
    pub openalex_last_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PublicationIdentifier {
    pub id: i64,
    pub publication_id: i64,
    pub kind: String,
    pub value_raw: String,
    pub value_normalized: String,
    pub confidence_score: f64,
    pub source: String,
    pub evidence_url: Option<String>,
}

/// Highest-confidence identifier for a publication, rendered for UI display.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayIdentifier {
    pub kind: String,
    pub value: String,
    pub label: String,
    pub url: Option<String>,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScholarPublicationLink {
    pub scholar_profile_id: i64,
    pub publication_id: i64,
    pub is_read: bool,
    pub is_favorite: bool,
    pub first_seen_run_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Scheduled,
}

impl TriggerType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Resolving,
    Success,
    PartialFailure,
    Failed,
    Canceled,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Resolving => "resolving",
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Resolving)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "running" => Self::Running,
            "resolving" => Self::Resolving,
            "success" => Self::Success,
            "partial_failure" => Self::PartialFailure,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CrawlRun {
    pub id: i64,
    pub user_id: i64,
    pub trigger_type: TriggerType,
    pub status: RunStatus,
    pub start_dt: DateTime<Utc>,
    pub end_dt: Option<DateTime<Utc>>,
    pub scholar_count: i64,
    pub new_pub_count: i64,
    pub idempotency_key: Option<String>,
    pub error_log: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Queued,
    Retrying,
    Dropped,
}

impl QueueItemStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Retrying => "retrying",
            Self::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: i64,
    pub user_id: i64,
    pub scholar_profile_id: i64,
    pub resume_cstart: i64,
    pub reason: String,
    pub status: QueueItemStatus,
    pub attempt_count: i64,
    pub next_attempt_dt: DateTime<Utc>,
    pub last_run_id: Option<i64>,
    pub last_error: Option<String>,
    pub dropped_reason: Option<String>,
    pub dropped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct QueueItemRow {
    pub id: i64,
    pub user_id: i64,
    pub scholar_profile_id: i64,
    pub resume_cstart: i64,
    pub reason: String,
    pub status: String,
    pub attempt_count: i64,
    pub next_attempt_dt: DateTime<Utc>,
    pub last_run_id: Option<i64>,
    pub last_error: Option<String>,
    pub dropped_reason: Option<String>,
    pub dropped_at: Option<DateTime<Utc>>,
}

impl From<QueueItemRow> for QueueItem {
    fn from(row: QueueItemRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            scholar_profile_id: row.scholar_profile_id,
            resume_cstart: row.resume_cstart,
            reason: row.reason,
            status: match row.status.as_str() {
                "retrying" => QueueItemStatus::Retrying,
                "dropped" => QueueItemStatus::Dropped,
                _ => QueueItemStatus::Queued,
            },
            attempt_count: row.attempt_count,
            next_attempt_dt: row.next_attempt_dt,
            last_run_id: row.last_run_id,
            last_error: row.last_error,
            dropped_reason: row.dropped_reason,
            dropped_at: row.dropped_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CrawlRunRow {
    pub id: i64,
    pub user_id: i64,
    pub trigger_type: String,
    pub status: String,
    pub start_dt: DateTime<Utc>,
    pub end_dt: Option<DateTime<Utc>>,
    pub scholar_count: i64,
    pub new_pub_count: i64,
    pub idempotency_key: Option<String>,
    pub error_log: Option<String>,
}

impl From<CrawlRunRow> for CrawlRun {
    fn from(row: CrawlRunRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            trigger_type: if row.trigger_type == "scheduled" {
                TriggerType::Scheduled
            } else {
                TriggerType::Manual
            },
            status: RunStatus::from_str_opt(&row.status).unwrap_or(RunStatus::Failed),
            start_dt: row.start_dt,
            end_dt: row.end_dt,
            scholar_count: row.scholar_count,
            new_pub_count: row.new_pub_count,
            idempotency_key: row.idempotency_key,
            error_log: row.error_log,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RemoteCacheEntry {
    pub service: String,
    pub query_fingerprint: String,
    pub payload: String,
    pub expires_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RemoteRuntimeState {
    pub service: String,
    pub state_key: String,
    pub next_allowed_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub consecutive_blocked_count: i64,
}
