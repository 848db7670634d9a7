//! Run Engine (C5): the central per-user scrape state machine.
//!
//! Gate (safety) → lock (advisory) → target resolution → run-record creation
//! → breadth-then-depth iteration over scholars → completion/summary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::IngestionConfig;
use crate::continuation_queue;
use crate::db;
use crate::db::models::{CrawlRun, RunStatus, ScholarProfile, TriggerType};
use crate::db::runs::CreateRunError;
use crate::db::Db;
use crate::error::RunStartError;
use crate::events::{EventBus, IngestionEvent};
use crate::fingerprint::{resolve_and_upsert_publication, DedupState};
use crate::paged_fetcher::{self, PagedParseResult, PagingPolicy};
use crate::safety::{self, SafetyState, SafetyThresholds};
use crate::scholar_source::ScholarSource;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub trigger: Option<TriggerType>,
    pub idempotency_key: Option<String>,
    pub scholar_subset: Option<Vec<i64>>,
    pub start_cstart_by_scholar_id: HashMap<i64, u32>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub crawl_run_id: i64,
    pub status: RunStatus,
    pub scholar_count: i64,
    pub succeeded_count: i64,
    pub failed_count: i64,
    pub partial_count: i64,
    pub new_publication_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScholarOutcome {
    Success,
    Partial,
    Failed,
}

struct ScholarPassResult {
    outcome: ScholarOutcome,
    continuation_cstart: Option<u32>,
    failure_bucket: Option<&'static str>,
    retries_used: u32,
    new_publication_count: i64,
}

/// Carries the alert-bucket counts alongside the public summary so the
/// safety feed, which runs after the per-scholar loop, can still see them.
struct RunSummaryWithFailures {
    summary: RunSummary,
    blocked_failures: u32,
    network_failures: u32,
}

/// Attempt to start and fully drive a run for `user_id`. Returns `Ok` only
/// after the run reaches a terminal or `resolving` status and enrichment has
/// been spawned; the background enrichment task itself is fire-and-forget.
pub async fn start_run(
    db: &Db,
    config: &IngestionConfig,
    source: &ScholarSource,
    event_bus: &EventBus,
    user_id: i64,
    options: RunOptions,
    now: DateTime<Utc>,
) -> Result<RunSummary, RunStartError> {
    let pool = &db.pool;

    // Phase A — Gate.
    let settings = db::users::get_or_create_settings(pool, user_id).await?;
    let mut safety_state = SafetyState::from_json(&settings.scrape_safety_state);
    if safety::is_cooldown_active(now, settings.scrape_cooldown_until) {
        safety::register_cooldown_blocked_start(&mut safety_state);
        db::users::update_safety_state(
            pool,
            user_id,
            &safety_state.to_json(),
            settings.scrape_cooldown_until,
            settings.scrape_cooldown_reason.as_deref(),
        )
        .await?;
        let payload = safety::get_safety_state_payload(
            now,
            settings.scrape_cooldown_until,
            settings.scrape_cooldown_reason.as_deref(),
        );
        return Err(RunStartError::BlockedBySafety(Box::new(payload)));
    }

    // Phase B — Lock. Held for the run's entire duration via the guard.
    let _guard = db
        .advisory_locks
        .try_acquire(user_id)
        .await
        .ok_or(RunStartError::AlreadyInProgress)?;

    // Phase C — Target resolution.
    let enabled = db::scholars::list_enabled(pool, user_id).await?;
    let targets: Vec<ScholarProfile> = match &options.scholar_subset {
        Some(subset) => {
            for scholar in &enabled {
                if !subset.contains(&scholar.id) {
                    continuation_queue::clear_job_for_scholar(pool, scholar.id)
                        .await
                        .map_err(queue_error_to_run_start)?;
                }
            }
            enabled.into_iter().filter(|s| subset.contains(&s.id)).collect()
        }
        None => enabled,
    };

    // Phase D — Run record creation.
    let trigger = options.trigger.unwrap_or(TriggerType::Manual);
    let run = match db::runs::create(pool, user_id, trigger, now, options.idempotency_key.as_deref()).await {
        Ok(run) => run,
        Err(CreateRunError::AlreadyActive { .. }) => return Err(RunStartError::AlreadyInProgress),
        Err(CreateRunError::IdempotencyConflict { existing_run_id }) => {
            return Err(RunStartError::IdempotencyConflict(existing_run_id));
        }
        Err(CreateRunError::Db(e)) => return Err(RunStartError::Database(e)),
    };
    db::users::record_run_start(pool, user_id, now).await?;

    // Phase E — breadth-then-depth iteration.
    let with_failures = drive_run(db, config, source, event_bus, &run, &targets, &options, now).await?;

    // Phase F — safety feed, persisted after the per-scholar tallies are known.
    let thresholds = SafetyThresholds {
        blocked_failure_threshold: config.alert_blocked_failure_threshold(),
        network_failure_threshold: config.alert_network_failure_threshold(),
        blocked_cooldown_seconds: config.safety_cooldown_blocked_seconds(),
        network_cooldown_seconds: config.safety_cooldown_network_seconds(),
    };
    let outcome = safety::apply_run_safety_outcome(
        safety_state,
        run.id,
        with_failures.blocked_failures,
        with_failures.network_failures,
        &thresholds,
        now,
        settings.scrape_cooldown_until,
        settings.scrape_cooldown_reason.as_deref(),
    );
    db::users::update_safety_state(
        pool,
        user_id,
        &outcome.state.to_json(),
        outcome.cooldown_until,
        outcome.cooldown_reason.as_deref(),
    )
    .await?;

    Ok(with_failures.summary)
}

fn queue_error_to_run_start(error: crate::error::QueueError) -> RunStartError {
    match error {
        crate::error::QueueError::Database(e) => RunStartError::Database(e),
        other => RunStartError::Database(sqlx::Error::Protocol(other.to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_run(
    db: &Db,
    config: &IngestionConfig,
    source: &ScholarSource,
    event_bus: &EventBus,
    run: &CrawlRun,
    targets: &[ScholarProfile],
    options: &RunOptions,
    now: DateTime<Utc>,
) -> Result<RunSummaryWithFailures, RunStartError> {
    let pool = &db.pool;
    let mut new_publication_count = 0i64;
    let mut tallies: HashMap<i64, ScholarTally> = HashMap::new();

    let mut continuations: Vec<(ScholarProfile, u32)> = Vec::new();

    // Pass 1: page 1 only, breadth-first across all targets.
    for (index, scholar) in targets.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(u64::from(config.request_delay_seconds()))).await;
        }
        let start_cstart = options
            .start_cstart_by_scholar_id
            .get(&scholar.id)
            .copied()
            .unwrap_or(0);

        let pass = process_scholar_page(db, config, source, event_bus, run.id, scholar, start_cstart, 1).await?;
        new_publication_count += pass.new_publication_count;
        tallies.insert(scholar.id, ScholarTally::from_pass(&pass));
        if let Some(cursor) = pass.continuation_cstart {
            if config.max_pages_per_scholar() > 1 {
                continuations.push((scholar.clone(), cursor));
            }
        }
    }

    // Pass 2: continue paginating scholars that produced a continuation in pass 1.
    // Each scholar's tally is replaced, not added to — a scholar's final outcome is
    // whichever pass processed it last, so a pass-1 partial superseded by a pass-2
    // success must not also count toward `partial`.
    for (index, (scholar, cursor)) in continuations.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(u64::from(config.request_delay_seconds()))).await;
        }
        let remaining_pages = config.max_pages_per_scholar() - 1;
        let pass =
            process_scholar_page(db, config, source, event_bus, run.id, scholar, *cursor, remaining_pages).await?;
        new_publication_count += pass.new_publication_count;
        tallies.insert(scholar.id, ScholarTally::from_pass(&pass));
    }

    let (succeeded, failed, partial, blocked_failures, network_failures, retries_scheduled_count) =
        summarize_tallies(tallies.values());

    let scholar_count = targets.len() as i64;

    // Phase F — Completion.
    let blocked_threshold = config.alert_blocked_failure_threshold().max(1);
    let network_threshold = config.alert_network_failure_threshold().max(1);
    let retry_threshold = config.alert_retry_scheduled_threshold().max(1);
    if blocked_failures >= blocked_threshold {
        warn!(event = "run_alert_blocked", run_id = run.id, blocked_failures, "blocked-failure alert threshold reached");
    }
    if network_failures >= network_threshold {
        warn!(event = "run_alert_network", run_id = run.id, network_failures, "network-failure alert threshold reached");
    }
    if retries_scheduled_count >= retry_threshold {
        warn!(event = "run_alert_retry_scheduled", run_id = run.id, retries_scheduled_count, "retry-scheduled alert threshold reached");
    }

    let status = resolve_run_status(scholar_count, succeeded, failed, partial);

    let summary = RunSummary {
        crawl_run_id: run.id,
        status,
        scholar_count,
        succeeded_count: succeeded,
        failed_count: failed,
        partial_count: partial,
        new_publication_count,
    };

    let already_canceled = db::runs::is_cancel_requested(pool, run.id).await?;
    if already_canceled {
        db::runs::finish(pool, run.id, RunStatus::Canceled, now, scholar_count, new_publication_count, None).await?;
    } else {
        db::runs::transition_to_resolving(pool, run.id).await?;
        spawn_enrichment_and_finish(
            db.clone(),
            config.clone(),
            event_bus.clone(),
            run.user_id,
            run.id,
            status,
            scholar_count,
            new_publication_count,
            now,
        );
    }

    Ok(RunSummaryWithFailures {
        summary,
        blocked_failures,
        network_failures,
    })
}

/// One scholar's most-recently-recorded per-run outcome. A scholar revisited
/// in pass 2 gets its pass-1 tally replaced here rather than added to, so the
/// aggregate counts below never double-count a single scholar.
#[derive(Debug, Clone, Copy)]
struct ScholarTally {
    outcome: ScholarOutcome,
    failure_bucket: Option<&'static str>,
    retried: bool,
}

impl ScholarTally {
    fn from_pass(pass: &ScholarPassResult) -> Self {
        Self {
            outcome: pass.outcome,
            failure_bucket: pass.failure_bucket,
            retried: pass.retries_used > 0,
        }
    }
}

#[allow(clippy::type_complexity)]
fn summarize_tallies<'a>(tallies: impl Iterator<Item = &'a ScholarTally>) -> (i64, i64, i64, u32, u32, u32) {
    let mut succeeded = 0i64;
    let mut failed = 0i64;
    let mut partial = 0i64;
    let mut blocked_failures = 0u32;
    let mut network_failures = 0u32;
    let mut retries_scheduled_count = 0u32;

    for tally in tallies {
        match tally.outcome {
            ScholarOutcome::Success => succeeded += 1,
            ScholarOutcome::Partial => partial += 1,
            ScholarOutcome::Failed => failed += 1,
        }
        match tally.failure_bucket {
            Some("blocked_or_captcha") => blocked_failures += 1,
            Some("network_error") => network_failures += 1,
            _ => {}
        }
        if tally.retried {
            retries_scheduled_count += 1;
        }
    }

    (succeeded, failed, partial, blocked_failures, network_failures, retries_scheduled_count)
}

fn resolve_run_status(scholar_count: i64, succeeded: i64, failed: i64, partial: i64) -> RunStatus {
    if scholar_count == 0 {
        RunStatus::Success
    } else if failed == scholar_count {
        RunStatus::Failed
    } else if failed > 0 || partial > 0 {
        RunStatus::PartialFailure
    } else if succeeded > 0 {
        RunStatus::Success
    } else {
        RunStatus::Failed
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_scholar_page(
    db: &Db,
    config: &IngestionConfig,
    source: &ScholarSource,
    event_bus: &EventBus,
    run_id: i64,
    scholar: &ScholarProfile,
    start_cstart: u32,
    max_pages: u32,
) -> Result<ScholarPassResult, RunStartError> {
    let pool = &db.pool;
    let policy = PagingPolicy {
        page_size: config.page_size(),
        max_pages,
        network_error_retries: config.network_error_retries(),
        retry_backoff_seconds: config.retry_backoff_seconds(),
        rate_limit_retries: config.rate_limit_retries(),
        rate_limit_backoff_seconds: config.rate_limit_backoff_seconds(),
        request_delay_seconds: config.request_delay_seconds(),
    };

    let result = paged_fetcher::fetch_paged(
        pool,
        source,
        run_id,
        &scholar.scholar_id,
        start_cstart,
        scholar.last_initial_page_fingerprint_sha256.as_deref(),
        &policy,
    )
    .await;

    let result = match result {
        Ok(result) => result,
        Err(error) => {
            warn!(event = "scholar_fetch_error", run_id, scholar_profile_id = scholar.id, error = %error, "scholar fetch failed");
            db::scholars::record_run_outcome(pool, scholar.id, "failed", Utc::now()).await?;
            if config.continuation_queue_enabled() {
                continuation_queue::upsert_job(
                    pool,
                    scholar.user_id,
                    scholar.id,
                    i64::from(start_cstart),
                    "network_error",
                    config.continuation_base_delay_seconds(),
                    Utc::now(),
                )
                .await
                .map_err(queue_error_to_run_start)?;
            }
            return Ok(ScholarPassResult {
                outcome: ScholarOutcome::Failed,
                continuation_cstart: None,
                failure_bucket: Some("network_error"),
                retries_used: 1,
                new_publication_count: 0,
            });
        }
    };

    apply_profile_metadata(pool, scholar, &result).await?;

    let outcome = classify_outcome(&result);
    let run_dt = Utc::now();
    db::scholars::record_run_outcome(pool, scholar.id, outcome_status_str(outcome), run_dt).await?;

    if paged_fetcher::should_persist_fingerprint(&result) {
        if let Some(fingerprint) = &result.first_page_fingerprint {
            db::scholars::persist_initial_page_fingerprint(pool, scholar.id, fingerprint, run_dt).await?;
        }
    }

    let mut new_publication_count = 0i64;
    if !result.skipped_no_change && outcome != ScholarOutcome::Failed {
        new_publication_count = upsert_profile_publications(pool, event_bus, run_id, scholar, &result).await?;
        if new_publication_count > 0 {
            info!(
                event = "publications_discovered",
                run_id,
                scholar_profile_id = scholar.id,
                new_publication_count,
                "new publications linked"
            );
        }
    }

    reconcile_continuation_queue(pool, config, scholar, &result).await?;

    let failure_bucket = failure_bucket_for(outcome, result.pagination_truncated_reason.as_deref());

    Ok(ScholarPassResult {
        outcome,
        continuation_cstart: result.continuation_cstart,
        failure_bucket,
        retries_used: u32::from(result.attempt_log.len() > 1),
        new_publication_count,
    })
}

fn failure_bucket_for(outcome: ScholarOutcome, reason: Option<&str>) -> Option<&'static str> {
    if outcome != ScholarOutcome::Failed {
        return None;
    }
    let reason = reason?;
    if reason.contains("blocked") || reason.contains("captcha") {
        Some("blocked_or_captcha")
    } else if reason.contains("network") {
        Some("network_error")
    } else {
        Some("ingestion_error")
    }
}

fn outcome_status_str(outcome: ScholarOutcome) -> &'static str {
    match outcome {
        ScholarOutcome::Success => "success",
        ScholarOutcome::Partial => "partial_failure",
        ScholarOutcome::Failed => "failed",
    }
}

fn classify_outcome(result: &PagedParseResult) -> ScholarOutcome {
    if result.skipped_no_change {
        return ScholarOutcome::Success;
    }
    if result.pagination_truncated_reason.is_some() {
        return if result.publications.is_empty() {
            ScholarOutcome::Failed
        } else {
            ScholarOutcome::Partial
        };
    }
    ScholarOutcome::Success
}

async fn apply_profile_metadata(
    pool: &SqlitePool,
    scholar: &ScholarProfile,
    result: &PagedParseResult,
) -> Result<(), sqlx::Error> {
    if result.profile_name.is_some() || result.profile_image_url.is_some() {
        db::scholars::apply_profile_metadata(
            pool,
            scholar.id,
            result.profile_name.as_deref(),
            result.profile_image_url.as_deref(),
        )
        .await?;
    }
    Ok(())
}

async fn upsert_profile_publications(
    pool: &SqlitePool,
    event_bus: &EventBus,
    run_id: i64,
    scholar: &ScholarProfile,
    result: &PagedParseResult,
) -> Result<i64, sqlx::Error> {
    let mut dedup = DedupState::new();
    let candidates = dedup.dedupe(result.publications.clone());
    let mut new_links = 0i64;

    for candidate in &candidates {
        let (publication_id, _is_new_publication) = resolve_and_upsert_publication(pool, candidate).await?;
        let is_new_link = db::publications::insert_link_if_new(pool, scholar.id, publication_id, run_id).await?;
        if is_new_link {
            new_links += 1;
            event_bus.publish(
                run_id,
                IngestionEvent::PublicationDiscovered {
                    publication_id,
                    title: candidate.title.clone(),
                    pub_url: candidate.title_url.clone(),
                    scholar_profile_id: scholar.id,
                    scholar_label: scholar.display_name.clone().unwrap_or_else(|| scholar.scholar_id.clone()),
                    first_seen_at: Utc::now(),
                    new_publication_count: new_links,
                },
            );
        }
    }
    Ok(new_links)
}

async fn reconcile_continuation_queue(
    pool: &SqlitePool,
    config: &IngestionConfig,
    scholar: &ScholarProfile,
    result: &PagedParseResult,
) -> Result<(), RunStartError> {
    if !config.continuation_queue_enabled() {
        return Ok(());
    }
    let is_resumable_partial = result.pagination_truncated_reason.as_deref().is_some_and(|reason| {
        reason == "max_pages_reached"
            || reason == "pagination_cursor_stalled"
            || reason.starts_with("page_state_network_error")
            || reason.starts_with("page_state_blocked_http_429_rate_limited")
    });

    if is_resumable_partial {
        if let Some(cursor) = result.continuation_cstart {
            continuation_queue::upsert_job(
                pool,
                scholar.user_id,
                scholar.id,
                i64::from(cursor),
                result.pagination_truncated_reason.as_deref().unwrap_or("unknown"),
                config.continuation_base_delay_seconds(),
                Utc::now(),
            )
            .await
            .map_err(queue_error_to_run_start)?;
            return Ok(());
        }
    }
    continuation_queue::clear_job_for_scholar(pool, scholar.id)
        .await
        .map_err(queue_error_to_run_start)?;
    Ok(())
}

/// Spawn C9 as a background task; the intended terminal status was already
/// computed before transitioning to `resolving`, so enrichment's completion
/// (or its failure fallback) restores it when done.
#[allow(clippy::too_many_arguments)]
fn spawn_enrichment_and_finish(
    db: Db,
    config: IngestionConfig,
    event_bus: EventBus,
    user_id: i64,
    run_id: i64,
    intended_status: RunStatus,
    scholar_count: i64,
    new_publication_count: i64,
    now: DateTime<Utc>,
) {
    tokio::spawn(async move {
        let pool = &db.pool;
        let enrichment_result =
            crate::enrichment::run_enrichment_pass(pool, &config, &event_bus, user_id, run_id, now).await;
        if let Err(error) = &enrichment_result {
            warn!(event = "enrichment_pass_failed", run_id, error = %error, "enrichment pass failed");
        }
        if let Err(error) =
            db::runs::finish(pool, run_id, intended_status, Utc::now(), scholar_count, new_publication_count, None).await
        {
            warn!(event = "run_finish_failed", run_id, error = %error, "failed to transition run out of resolving");
        }
    });
}
