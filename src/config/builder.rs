//! Type-safe builder for `IngestionConfig` using the typestate pattern
//!
//! Mirrors this codebase's `CrawlConfigBuilder` convention: a single required
//! field (the database URL) gates `build()` at compile time, everything else
//! has a sane default and can be overridden with a `with_*` call.

use crate::error::ConfigError;
use crate::utils::{
    MIN_REQUEST_DELAY_SECONDS, MIN_RUN_INTERVAL_MINUTES,
};
use std::marker::PhantomData;

use super::types::IngestionConfig;

// Type states for the builder.
pub struct Unconfigured;
pub struct Ready;

pub struct IngestionConfigBuilder<State = Unconfigured> {
    database_url: Option<String>,
    request_delay_seconds: u32,
    run_interval_minutes: u32,
    ingestion_network_error_retries: u32,
    ingestion_retry_backoff_seconds: u64,
    ingestion_rate_limit_retries: u32,
    ingestion_rate_limit_backoff_seconds: u64,
    ingestion_max_pages_per_scholar: u32,
    ingestion_page_size: u32,
    ingestion_continuation_queue_enabled: bool,
    ingestion_continuation_base_delay_seconds: u64,
    ingestion_continuation_max_delay_seconds: u64,
    ingestion_continuation_max_attempts: u32,
    scheduler_tick_seconds: u64,
    scheduler_queue_batch_size: u32,
    ingestion_alert_blocked_failure_threshold: u32,
    ingestion_alert_network_failure_threshold: u32,
    ingestion_alert_retry_scheduled_threshold: u32,
    ingestion_safety_cooldown_blocked_seconds: i64,
    ingestion_safety_cooldown_network_seconds: i64,
    arxiv_enabled: bool,
    arxiv_timeout_seconds: f64,
    arxiv_default_max_results: u32,
    arxiv_cache_ttl_seconds: i64,
    arxiv_cache_max_entries: usize,
    arxiv_mailto: Option<String>,
    author_search_cache_ttl_seconds: i64,
    author_search_cache_max_entries: usize,
    author_search_cooldown_seconds: i64,
    author_search_jitter_seconds: f64,
    author_search_blocked_threshold: u32,
    openalex_api_key: Option<String>,
    crossref_api_mailto: Option<String>,
    _phantom: PhantomData<State>,
}

impl Default for IngestionConfigBuilder<Unconfigured> {
    fn default() -> Self {
        Self {
            database_url: None,
            request_delay_seconds: MIN_REQUEST_DELAY_SECONDS,
            run_interval_minutes: MIN_RUN_INTERVAL_MINUTES,
            ingestion_network_error_retries: 3,
            ingestion_retry_backoff_seconds: 2,
            ingestion_rate_limit_retries: 3,
            ingestion_rate_limit_backoff_seconds: 5,
            ingestion_max_pages_per_scholar: 10,
            ingestion_page_size: 100,
            ingestion_continuation_queue_enabled: true,
            ingestion_continuation_base_delay_seconds: 60,
            ingestion_continuation_max_delay_seconds: 3600,
            ingestion_continuation_max_attempts: 5,
            scheduler_tick_seconds: 30,
            scheduler_queue_batch_size: 20,
            ingestion_alert_blocked_failure_threshold: 1,
            ingestion_alert_network_failure_threshold: 1,
            ingestion_alert_retry_scheduled_threshold: 1,
            ingestion_safety_cooldown_blocked_seconds: 1800,
            ingestion_safety_cooldown_network_seconds: 600,
            arxiv_enabled: true,
            arxiv_timeout_seconds: 10.0,
            arxiv_default_max_results: 10,
            arxiv_cache_ttl_seconds: 3600,
            arxiv_cache_max_entries: 10_000,
            arxiv_mailto: None,
            author_search_cache_ttl_seconds: 1800,
            author_search_cache_max_entries: 2_000,
            author_search_cooldown_seconds: 300,
            author_search_jitter_seconds: 1.5,
            author_search_blocked_threshold: 3,
            openalex_api_key: None,
            crossref_api_mailto: None,
            _phantom: PhantomData,
        }
    }
}

impl IngestionConfigBuilder<Unconfigured> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SQLite database URL (e.g. `sqlite://data/ingestion.db`).
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> IngestionConfigBuilder<Ready> {
        self.database_url = Some(url.into());
        IngestionConfigBuilder {
            database_url: self.database_url,
            request_delay_seconds: self.request_delay_seconds,
            run_interval_minutes: self.run_interval_minutes,
            ingestion_network_error_retries: self.ingestion_network_error_retries,
            ingestion_retry_backoff_seconds: self.ingestion_retry_backoff_seconds,
            ingestion_rate_limit_retries: self.ingestion_rate_limit_retries,
            ingestion_rate_limit_backoff_seconds: self.ingestion_rate_limit_backoff_seconds,
            ingestion_max_pages_per_scholar: self.ingestion_max_pages_per_scholar,
            ingestion_page_size: self.ingestion_page_size,
            ingestion_continuation_queue_enabled: self.ingestion_continuation_queue_enabled,
            ingestion_continuation_base_delay_seconds: self
                .ingestion_continuation_base_delay_seconds,
            ingestion_continuation_max_delay_seconds: self
                .ingestion_continuation_max_delay_seconds,
            ingestion_continuation_max_attempts: self.ingestion_continuation_max_attempts,
            scheduler_tick_seconds: self.scheduler_tick_seconds,
            scheduler_queue_batch_size: self.scheduler_queue_batch_size,
            ingestion_alert_blocked_failure_threshold: self
                .ingestion_alert_blocked_failure_threshold,
            ingestion_alert_network_failure_threshold: self
                .ingestion_alert_network_failure_threshold,
            ingestion_alert_retry_scheduled_threshold: self
                .ingestion_alert_retry_scheduled_threshold,
            ingestion_safety_cooldown_blocked_seconds: self
                .ingestion_safety_cooldown_blocked_seconds,
            ingestion_safety_cooldown_network_seconds: self
                .ingestion_safety_cooldown_network_seconds,
            arxiv_enabled: self.arxiv_enabled,
            arxiv_timeout_seconds: self.arxiv_timeout_seconds,
            arxiv_default_max_results: self.arxiv_default_max_results,
            arxiv_cache_ttl_seconds: self.arxiv_cache_ttl_seconds,
            arxiv_cache_max_entries: self.arxiv_cache_max_entries,
            arxiv_mailto: self.arxiv_mailto,
            author_search_cache_ttl_seconds: self.author_search_cache_ttl_seconds,
            author_search_cache_max_entries: self.author_search_cache_max_entries,
            author_search_cooldown_seconds: self.author_search_cooldown_seconds,
            author_search_jitter_seconds: self.author_search_jitter_seconds,
            author_search_blocked_threshold: self.author_search_blocked_threshold,
            openalex_api_key: self.openalex_api_key,
            crossref_api_mailto: self.crossref_api_mailto,
            _phantom: PhantomData,
        }
    }
}

/// Shared setters, available in any builder state.
macro_rules! setter {
    ($name:ident: $ty:ty) => {
        #[must_use]
        pub fn $name(mut self, value: $ty) -> Self {
            self.$name = value;
            self
        }
    };
}

impl<State> IngestionConfigBuilder<State> {
    setter!(request_delay_seconds: u32);
    setter!(run_interval_minutes: u32);
    setter!(ingestion_network_error_retries: u32);
    setter!(ingestion_retry_backoff_seconds: u64);
    setter!(ingestion_rate_limit_retries: u32);
    setter!(ingestion_rate_limit_backoff_seconds: u64);
    setter!(ingestion_max_pages_per_scholar: u32);
    setter!(ingestion_page_size: u32);
    setter!(ingestion_continuation_queue_enabled: bool);
    setter!(ingestion_continuation_base_delay_seconds: u64);
    setter!(ingestion_continuation_max_delay_seconds: u64);
    setter!(ingestion_continuation_max_attempts: u32);
    setter!(scheduler_tick_seconds: u64);
    setter!(scheduler_queue_batch_size: u32);
    setter!(ingestion_alert_blocked_failure_threshold: u32);
    setter!(ingestion_alert_network_failure_threshold: u32);
    setter!(ingestion_alert_retry_scheduled_threshold: u32);
    setter!(ingestion_safety_cooldown_blocked_seconds: i64);
    setter!(ingestion_safety_cooldown_network_seconds: i64);
    setter!(arxiv_enabled: bool);
    setter!(arxiv_timeout_seconds: f64);
    setter!(arxiv_default_max_results: u32);
    setter!(arxiv_cache_ttl_seconds: i64);
    setter!(arxiv_cache_max_entries: usize);
    setter!(author_search_cache_ttl_seconds: i64);
    setter!(author_search_cache_max_entries: usize);
    setter!(author_search_cooldown_seconds: i64);
    setter!(author_search_jitter_seconds: f64);
    setter!(author_search_blocked_threshold: u32);

    #[must_use]
    pub fn arxiv_mailto(mut self, mailto: impl Into<String>) -> Self {
        self.arxiv_mailto = Some(mailto.into());
        self
    }

    #[must_use]
    pub fn openalex_api_key(mut self, key: impl Into<String>) -> Self {
        self.openalex_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn crossref_api_mailto(mut self, mailto: impl Into<String>) -> Self {
        self.crossref_api_mailto = Some(mailto.into());
        self
    }
}

impl IngestionConfigBuilder<Ready> {
    /// Validate cross-field minimums and produce the final config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `request_delay_seconds` or
    /// `run_interval_minutes` fall below their enforced floors.
    pub fn build(self) -> Result<IngestionConfig, ConfigError> {
        if self.request_delay_seconds < MIN_REQUEST_DELAY_SECONDS {
            return Err(ConfigError::BelowMinimum {
                field: "request_delay_seconds",
                minimum: i64::from(MIN_REQUEST_DELAY_SECONDS),
                actual: i64::from(self.request_delay_seconds),
            });
        }
        if self.run_interval_minutes < MIN_RUN_INTERVAL_MINUTES {
            return Err(ConfigError::BelowMinimum {
                field: "run_interval_minutes",
                minimum: i64::from(MIN_RUN_INTERVAL_MINUTES),
                actual: i64::from(self.run_interval_minutes),
            });
        }
        let database_url = self
            .database_url
            .ok_or(ConfigError::MissingField("database_url"))?;

        Ok(IngestionConfig {
            database_url,
            request_delay_seconds: self.request_delay_seconds,
            min_request_delay_seconds: MIN_REQUEST_DELAY_SECONDS,
            run_interval_minutes: self.run_interval_minutes,
            ingestion_network_error_retries: self.ingestion_network_error_retries,
            ingestion_retry_backoff_seconds: self.ingestion_retry_backoff_seconds,
            ingestion_rate_limit_retries: self.ingestion_rate_limit_retries,
            ingestion_rate_limit_backoff_seconds: self.ingestion_rate_limit_backoff_seconds,
            ingestion_max_pages_per_scholar: self.ingestion_max_pages_per_scholar,
            ingestion_page_size: self.ingestion_page_size,
            ingestion_continuation_queue_enabled: self.ingestion_continuation_queue_enabled,
            ingestion_continuation_base_delay_seconds: self
                .ingestion_continuation_base_delay_seconds,
            ingestion_continuation_max_delay_seconds: self
                .ingestion_continuation_max_delay_seconds,
            ingestion_continuation_max_attempts: self.ingestion_continuation_max_attempts,
            scheduler_tick_seconds: self.scheduler_tick_seconds,
            scheduler_queue_batch_size: self.scheduler_queue_batch_size,
            ingestion_alert_blocked_failure_threshold: self
                .ingestion_alert_blocked_failure_threshold,
            ingestion_alert_network_failure_threshold: self
                .ingestion_alert_network_failure_threshold,
            ingestion_alert_retry_scheduled_threshold: self
                .ingestion_alert_retry_scheduled_threshold,
            ingestion_safety_cooldown_blocked_seconds: self
                .ingestion_safety_cooldown_blocked_seconds,
            ingestion_safety_cooldown_network_seconds: self
                .ingestion_safety_cooldown_network_seconds,
            arxiv_enabled: self.arxiv_enabled,
            arxiv_timeout_seconds: self.arxiv_timeout_seconds,
            arxiv_default_max_results: self.arxiv_default_max_results,
            arxiv_cache_ttl_seconds: self.arxiv_cache_ttl_seconds,
            arxiv_cache_max_entries: self.arxiv_cache_max_entries,
            arxiv_mailto: self.arxiv_mailto,
            author_search_cache_ttl_seconds: self.author_search_cache_ttl_seconds,
            author_search_cache_max_entries: self.author_search_cache_max_entries,
            author_search_cooldown_seconds: self.author_search_cooldown_seconds,
            author_search_jitter_seconds: self.author_search_jitter_seconds,
            author_search_blocked_threshold: self.author_search_blocked_threshold,
            openalex_api_key: self.openalex_api_key,
            crossref_api_mailto: self.crossref_api_mailto,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let cfg = IngestionConfigBuilder::new()
            .database_url("sqlite::memory:")
            .build()
            .unwrap();
        assert_eq!(cfg.request_delay_seconds(), MIN_REQUEST_DELAY_SECONDS);
        assert_eq!(cfg.run_interval_minutes(), MIN_RUN_INTERVAL_MINUTES);
    }

    #[test]
    fn rejects_request_delay_below_minimum() {
        let err = IngestionConfigBuilder::new()
            .database_url("sqlite::memory:")
            .request_delay_seconds(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "request_delay_seconds", .. }));
    }

    #[test]
    fn rejects_run_interval_below_minimum() {
        let err = IngestionConfigBuilder::new()
            .database_url("sqlite::memory:")
            .run_interval_minutes(5)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "run_interval_minutes", .. }));
    }
}
