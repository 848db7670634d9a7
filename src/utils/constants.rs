//! Shared configuration constants for the ingestion core
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

/// Minimum delay between consecutive Scholar requests, in seconds.
///
/// Enforced as a database check constraint on `UserSettings.request_delay_seconds`
/// as well as at the config layer; values below this are rejected.
pub const MIN_REQUEST_DELAY_SECONDS: u32 = 2;

/// Minimum auto-run interval, in minutes.
pub const MIN_RUN_INTERVAL_MINUTES: u32 = 15;

/// Per-user advisory-lock namespace, matching the original Postgres
/// `pg_try_advisory_xact_lock(8217, user_id)` call site.
pub const RUN_LOCK_NAMESPACE: i64 = 8217;

/// Intra-run fuzzy title dedup threshold (token-set Jaccard).
pub const CANONICAL_DEDUP_THRESHOLD: f64 = 0.82;

/// Default threshold for the standalone `fuzzy_titles_match` helper.
pub const DEFAULT_FUZZY_MATCH_THRESHOLD: f64 = 0.85;

/// Maximum number of publications folded into the initial-page fingerprint.
pub const INITIAL_PAGE_FINGERPRINT_MAX_PUBLICATIONS: usize = 30;

/// Enrichment batch size (publications per OpenAlex filter call).
pub const ENRICHMENT_BATCH_SIZE: usize = 25;

/// Re-attempt enrichment for a publication only after this many days.
pub const ENRICHMENT_RETRY_AFTER_DAYS: i64 = 7;

/// Sleep duration on an OpenAlex ordinary rate limit, in seconds.
pub const ENRICHMENT_RATE_LIMIT_SLEEP_SECONDS: u64 = 60;

/// Minimum title-similarity ratio (0-100 scale) to accept an OpenAlex match.
pub const ENRICHMENT_MATCH_MIN_RATIO: f64 = 90.0;

/// Default scholar profile page size.
pub const DEFAULT_INGESTION_PAGE_SIZE: u32 = 100;

/// Default number of pages a single scholar run may fetch.
pub const DEFAULT_MAX_PAGES_PER_SCHOLAR: u32 = 10;

/// Floor applied to every computed cooldown duration, in seconds.
pub const COOLDOWN_MINIMUM_SECONDS: i64 = 60;

/// Floor applied to thresholds compared against failure counts.
pub const THRESHOLD_MINIMUM: u32 = 1;

pub const COOLDOWN_REASON_BLOCKED_FAILURE_THRESHOLD: &str = "blocked_failure_threshold_exceeded";
pub const COOLDOWN_REASON_NETWORK_FAILURE_THRESHOLD: &str = "network_failure_threshold_exceeded";

/// Contact-mail user agent template for external scholarly APIs (arXiv, OpenAlex).
pub const SCHOLARLY_API_USER_AGENT_TEMPLATE: &str = "scholarr-ingestion/1.0 (mailto:{mailto})";

/// Rotated user agents for Google Scholar fetches.
pub const SCHOLAR_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
];

/// Hosts that indicate a Scholar sign-in / accounts redirect.
pub const SCHOLAR_SIGNIN_HOSTS: &[&str] = &["accounts.google.com", "accounts.google.co.in"];

/// Minimum bound applied to any configured remote-fetch timeout, in seconds.
pub const MIN_FETCH_TIMEOUT_SECONDS: f64 = 0.5;
