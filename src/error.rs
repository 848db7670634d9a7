//! Crate-wide error taxonomy
//!
//! Each component gets its own `thiserror`-derived error enum so call sites can
//! match on specific variants; [`IngestionError`] aggregates them for the few
//! call sites (the scheduler, the binary entrypoint) that need a single type.

use thiserror::Error;

/// Errors raised while performing a single Scholar Source fetch (C1).
#[derive(Debug, Error)]
pub enum ScholarSourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("invalid scholar id: {0}")]
    InvalidScholarId(String),
}

/// A layout-invariant violation, mirroring the original's `ScholarDomInvariantError`.
///
/// Carries a machine-readable `code` (e.g. `"layout_markers_missing"`,
/// `"layout_row_citation_unparseable"`) in addition to the human message.
#[derive(Debug, Error)]
#[error("layout invariant violated ({code}): {message}")]
pub struct LayoutInvariantError {
    pub code: String,
    pub message: String,
}

impl LayoutInvariantError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while driving C4's per-scholar paging loop.
#[derive(Debug, Error)]
pub enum FetchPageError {
    #[error(transparent)]
    Source(#[from] ScholarSourceError),
    #[error(transparent)]
    Layout(#[from] LayoutInvariantError),
}

/// The full safety-state payload, carried by [`RunStartError::BlockedBySafety`]
/// so callers can render cooldown details without a second query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SafetyStatePayload {
    pub cooldown_active: bool,
    pub cooldown_reason: Option<String>,
    pub cooldown_reason_label: Option<String>,
    pub cooldown_until: Option<chrono::DateTime<chrono::Utc>>,
    pub cooldown_remaining_seconds: i64,
    pub recommended_action: Option<String>,
}

/// Errors that can prevent a run from starting, modeled as tagged variants
/// rather than exceptions (§9 Design Notes: "model as tagged result variants").
#[derive(Debug, Error)]
pub enum RunStartError {
    #[error("run already in progress for this user")]
    AlreadyInProgress,
    #[error("blocked by safety policy: cooldown active")]
    BlockedBySafety(Box<SafetyStatePayload>),
    #[error("idempotency conflict: reusing existing run {0}")]
    IdempotencyConflict(i64),
    #[error("run is not cancelable in its current state")]
    NotCancelable,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised by the continuation queue (C6).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no queue item with id {0}")]
    NotFound(i64),
}

/// Errors raised by the shared cache / single-flight layer (C8).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("remote service rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: i64 },
    #[error("remote service cooldown active: retry after {retry_after_seconds}s")]
    CooldownActive { retry_after_seconds: i64 },
}

/// Errors raised while calling the arXiv gateway.
#[derive(Debug, Error)]
pub enum ArxivError {
    #[error("arxiv rate limited")]
    RateLimited,
    #[error("arxiv disabled by configuration")]
    Disabled,
    #[error("arxiv request failed: {0}")]
    Request(String),
    #[error("arxiv feed parse error: {0}")]
    Parse(String),
}

/// Errors raised while calling OpenAlex.
#[derive(Debug, Error)]
pub enum OpenAlexError {
    #[error("openalex daily budget exhausted")]
    BudgetExhausted,
    #[error("openalex rate limited")]
    RateLimited,
    #[error("openalex request failed: {0}")]
    Request(String),
}

/// Errors raised by the enrichment pipeline (C9).
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    OpenAlex(#[from] OpenAlexError),
}

/// Errors raised by the scheduler (C10).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised when a config value fails validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be >= {minimum}, got {actual}")]
    BelowMinimum {
        field: &'static str,
        minimum: i64,
        actual: i64,
    },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Crate-wide aggregate error for call sites that need one type to match against.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    RunStart(#[from] RunStartError),
    #[error(transparent)]
    FetchPage(#[from] FetchPageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
