//! Core configuration type for the ingestion core
//!
//! This module contains the main `IngestionConfig` struct, covering every
//! parameter listed in the external-interfaces configuration surface.

use serde::{Deserialize, Serialize};

/// Runtime configuration for the ingestion core.
///
/// Constructed via [`super::builder::IngestionConfigBuilder`]; never built by
/// hand, since several fields have cross-field minimums enforced at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub(crate) database_url: String,

    pub(crate) request_delay_seconds: u32,
    pub(crate) min_request_delay_seconds: u32,
    pub(crate) run_interval_minutes: u32,

    pub(crate) ingestion_network_error_retries: u32,
    pub(crate) ingestion_retry_backoff_seconds: u64,
    pub(crate) ingestion_rate_limit_retries: u32,
    pub(crate) ingestion_rate_limit_backoff_seconds: u64,
    pub(crate) ingestion_max_pages_per_scholar: u32,
    pub(crate) ingestion_page_size: u32,

    pub(crate) ingestion_continuation_queue_enabled: bool,
    pub(crate) ingestion_continuation_base_delay_seconds: u64,
    pub(crate) ingestion_continuation_max_delay_seconds: u64,
    pub(crate) ingestion_continuation_max_attempts: u32,

    pub(crate) scheduler_tick_seconds: u64,
    pub(crate) scheduler_queue_batch_size: u32,

    pub(crate) ingestion_alert_blocked_failure_threshold: u32,
    pub(crate) ingestion_alert_network_failure_threshold: u32,
    pub(crate) ingestion_alert_retry_scheduled_threshold: u32,
    pub(crate) ingestion_safety_cooldown_blocked_seconds: i64,
    pub(crate) ingestion_safety_cooldown_network_seconds: i64,

    pub(crate) arxiv_enabled: bool,
    pub(crate) arxiv_timeout_seconds: f64,
    pub(crate) arxiv_default_max_results: u32,
    pub(crate) arxiv_cache_ttl_seconds: i64,
    pub(crate) arxiv_cache_max_entries: usize,
    pub(crate) arxiv_mailto: Option<String>,

    pub(crate) author_search_cache_ttl_seconds: i64,
    pub(crate) author_search_cache_max_entries: usize,
    pub(crate) author_search_cooldown_seconds: i64,
    pub(crate) author_search_jitter_seconds: f64,
    pub(crate) author_search_blocked_threshold: u32,

    pub(crate) openalex_api_key: Option<String>,
    pub(crate) crossref_api_mailto: Option<String>,
}

impl IngestionConfig {
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    #[must_use]
    pub fn request_delay_seconds(&self) -> u32 {
        self.request_delay_seconds
    }

    #[must_use]
    pub fn run_interval_minutes(&self) -> u32 {
        self.run_interval_minutes
    }

    #[must_use]
    pub fn network_error_retries(&self) -> u32 {
        self.ingestion_network_error_retries
    }

    #[must_use]
    pub fn retry_backoff_seconds(&self) -> u64 {
        self.ingestion_retry_backoff_seconds
    }

    #[must_use]
    pub fn rate_limit_retries(&self) -> u32 {
        self.ingestion_rate_limit_retries
    }

    #[must_use]
    pub fn rate_limit_backoff_seconds(&self) -> u64 {
        self.ingestion_rate_limit_backoff_seconds
    }

    #[must_use]
    pub fn max_pages_per_scholar(&self) -> u32 {
        self.ingestion_max_pages_per_scholar
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.ingestion_page_size
    }

    #[must_use]
    pub fn continuation_queue_enabled(&self) -> bool {
        self.ingestion_continuation_queue_enabled
    }

    #[must_use]
    pub fn continuation_base_delay_seconds(&self) -> u64 {
        self.ingestion_continuation_base_delay_seconds
    }

    #[must_use]
    pub fn continuation_max_delay_seconds(&self) -> u64 {
        self.ingestion_continuation_max_delay_seconds
    }

    #[must_use]
    pub fn continuation_max_attempts(&self) -> u32 {
        self.ingestion_continuation_max_attempts
    }

    #[must_use]
    pub fn scheduler_tick_seconds(&self) -> u64 {
        self.scheduler_tick_seconds
    }

    #[must_use]
    pub fn scheduler_queue_batch_size(&self) -> u32 {
        self.scheduler_queue_batch_size
    }

    #[must_use]
    pub fn alert_blocked_failure_threshold(&self) -> u32 {
        self.ingestion_alert_blocked_failure_threshold
    }

    #[must_use]
    pub fn alert_network_failure_threshold(&self) -> u32 {
        self.ingestion_alert_network_failure_threshold
    }

    #[must_use]
    pub fn alert_retry_scheduled_threshold(&self) -> u32 {
        self.ingestion_alert_retry_scheduled_threshold
    }

    #[must_use]
    pub fn safety_cooldown_blocked_seconds(&self) -> i64 {
        self.ingestion_safety_cooldown_blocked_seconds
    }

    #[must_use]
    pub fn safety_cooldown_network_seconds(&self) -> i64 {
        self.ingestion_safety_cooldown_network_seconds
    }

    #[must_use]
    pub fn arxiv_enabled(&self) -> bool {
        self.arxiv_enabled
    }

    #[must_use]
    pub fn arxiv_timeout_seconds(&self) -> f64 {
        self.arxiv_timeout_seconds
    }

    #[must_use]
    pub fn arxiv_default_max_results(&self) -> u32 {
        self.arxiv_default_max_results
    }

    #[must_use]
    pub fn arxiv_cache_ttl_seconds(&self) -> i64 {
        self.arxiv_cache_ttl_seconds
    }

    #[must_use]
    pub fn arxiv_cache_max_entries(&self) -> usize {
        self.arxiv_cache_max_entries
    }

    #[must_use]
    pub fn arxiv_mailto(&self) -> Option<&str> {
        self.arxiv_mailto.as_deref()
    }

    #[must_use]
    pub fn author_search_cache_ttl_seconds(&self) -> i64 {
        self.author_search_cache_ttl_seconds
    }

    #[must_use]
    pub fn author_search_cache_max_entries(&self) -> usize {
        self.author_search_cache_max_entries
    }

    #[must_use]
    pub fn author_search_cooldown_seconds(&self) -> i64 {
        self.author_search_cooldown_seconds
    }

    #[must_use]
    pub fn author_search_jitter_seconds(&self) -> f64 {
        self.author_search_jitter_seconds
    }

    #[must_use]
    pub fn author_search_blocked_threshold(&self) -> u32 {
        self.author_search_blocked_threshold
    }

    #[must_use]
    pub fn openalex_api_key(&self) -> Option<&str> {
        self.openalex_api_key.as_deref()
    }

    #[must_use]
    pub fn crossref_api_mailto(&self) -> Option<&str> {
        self.crossref_api_mailto.as_deref()
    }
}
