//! Scheduler (C10): a single ticker that drains due continuation-queue jobs
//! and kicks off auto-run users whose interval has elapsed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::IngestionConfig;
use crate::continuation_queue;
use crate::db::models::{QueueItem, TriggerType};
use crate::db::Db;
use crate::error::{RunStartError, SchedulerError};
use crate::events::EventBus;
use crate::run_engine::{self, RunOptions};
use crate::scholar_source::ScholarSource;

/// Drive the scheduler tick loop until `shutdown` resolves. Intended to be
/// spawned once per process.
pub async fn run(
    db: Db,
    config: IngestionConfig,
    source: ScholarSource,
    event_bus: EventBus,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(config.scheduler_tick_seconds()));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(error) = tick(&db, &config, &source, &event_bus).await {
                    warn!(event = "scheduler_tick_failed", error = %error, "scheduler tick failed");
                }
            }
            _ = &mut shutdown => {
                info!(event = "scheduler_shutdown", "scheduler received shutdown signal");
                return;
            }
        }
    }
}

/// One scheduler tick: drain due continuation-queue jobs, then kick off any
/// auto-run users whose interval has elapsed.
pub async fn tick(
    db: &Db,
    config: &IngestionConfig,
    source: &ScholarSource,
    event_bus: &EventBus,
) -> Result<(), SchedulerError> {
    let now = Utc::now();
    let due_jobs = continuation_queue::list_due_jobs(&db.pool, now, i64::from(config.scheduler_queue_batch_size()))
        .await
        .map_err(|e| SchedulerError::Database(sqlx::Error::Protocol(e.to_string())))?;

    for job in due_jobs {
        dispatch_queue_job(db, config, source, event_bus, job).await;
    }

    let due_users = crate::db::users::list_due_for_scheduled_run(&db.pool, now).await?;
    for user_id in due_users {
        dispatch_scheduled_run(db, config, source, event_bus, user_id, now).await;
    }

    Ok(())
}

async fn dispatch_queue_job(
    db: &Db,
    config: &IngestionConfig,
    source: &ScholarSource,
    event_bus: &EventBus,
    job: QueueItem,
) {
    let now = Utc::now();
    let mut start_cstart_by_scholar_id = std::collections::HashMap::new();
    start_cstart_by_scholar_id.insert(job.scholar_profile_id, job.resume_cstart.max(0) as u32);

    let options = RunOptions {
        trigger: Some(TriggerType::Scheduled),
        idempotency_key: None,
        scholar_subset: Some(vec![job.scholar_profile_id]),
        start_cstart_by_scholar_id,
    };

    match run_engine::start_run(db, config, source, event_bus, job.user_id, options, now).await {
        Ok(summary) => {
            info!(event = "queue_job_dispatched", job_id = job.id, run_id = summary.crawl_run_id, "continuation job dispatched");
            if let Err(error) = continuation_queue::mark_succeeded(&db.pool, job.id).await {
                warn!(event = "queue_job_clear_failed", job_id = job.id, error = %error, "failed to clear dispatched queue job");
            }
        }
        Err(error) => reschedule_after_dispatch_failure(db, config, job, error, now).await,
    }
}

/// §4.10's exception-mapping logic: an already-active run or an active safety
/// cooldown are not failures of the job itself, so they get bespoke backoffs
/// rather than the standard exponential schedule.
async fn reschedule_after_dispatch_failure(
    db: &Db,
    config: &IngestionConfig,
    job: QueueItem,
    error: RunStartError,
    now: chrono::DateTime<Utc>,
) {
    const USER_RUN_LOCK_RETRY_SECONDS: u64 = 30;

    let (reason, forced_delay) = match &error {
        RunStartError::AlreadyInProgress => ("user_run_lock_active", Some(USER_RUN_LOCK_RETRY_SECONDS)),
        RunStartError::BlockedBySafety(payload) => (
            "safety_cooldown_active",
            Some(payload.cooldown_remaining_seconds.max(0) as u64 + 1),
        ),
        _ => ("dispatch_error", None),
    };

    if let Some(delay) = forced_delay {
        let next_attempt_dt = now + chrono::Duration::seconds(delay as i64);
        if let Err(e) = crate::db::queue::reschedule_job(&db.pool, job.id, next_attempt_dt).await {
            warn!(event = "queue_job_reschedule_failed", job_id = job.id, error = %e, "failed to reschedule queue job");
        }
        return;
    }

    warn!(event = "queue_job_dispatch_failed", job_id = job.id, reason, error = %error, "queue job dispatch failed");
    if let Err(e) = continuation_queue::reschedule_job(
        &db.pool,
        &job,
        config.continuation_base_delay_seconds(),
        config.continuation_max_delay_seconds(),
        config.continuation_max_attempts(),
        None,
        &error.to_string(),
        now,
    )
    .await
    {
        warn!(event = "queue_job_reschedule_failed", job_id = job.id, error = %e, "failed to reschedule queue job");
    }
}

async fn dispatch_scheduled_run(
    db: &Db,
    config: &IngestionConfig,
    source: &ScholarSource,
    event_bus: &EventBus,
    user_id: i64,
    now: chrono::DateTime<Utc>,
) {
    let options = RunOptions {
        trigger: Some(TriggerType::Scheduled),
        idempotency_key: None,
        scholar_subset: None,
        start_cstart_by_scholar_id: std::collections::HashMap::new(),
    };
    match run_engine::start_run(db, config, source, event_bus, user_id, options, now).await {
        Ok(summary) => {
            info!(event = "scheduled_run_started", user_id, run_id = summary.crawl_run_id, "scheduled run started");
        }
        Err(RunStartError::AlreadyInProgress) => {
            info!(event = "scheduled_run_skipped", user_id, reason = "user_run_lock_active", "scheduled run skipped");
        }
        Err(RunStartError::BlockedBySafety(payload)) => {
            info!(
                event = "scheduled_run_skipped",
                user_id,
                reason = "safety_cooldown_active",
                remaining_seconds = payload.cooldown_remaining_seconds,
                "scheduled run skipped"
            );
        }
        Err(error) => {
            warn!(event = "scheduled_run_failed", user_id, error = %error, "scheduled run failed to start");
        }
    }
}

/// Spawn the scheduler loop as a background task, returning a handle that can
/// be used to signal shutdown.
pub fn spawn(
    db: Db,
    config: IngestionConfig,
    source: ScholarSource,
    event_bus: EventBus,
) -> SchedulerHandle {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let join_handle = tokio::spawn(run(db, config, source, event_bus, rx));
    SchedulerHandle {
        shutdown: Some(tx),
        join_handle: Arc::new(tokio::sync::Mutex::new(Some(join_handle))),
    }
}

/// Handle for a spawned scheduler loop.
pub struct SchedulerHandle {
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    join_handle: Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl SchedulerHandle {
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.join_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tick_with_no_due_work_is_a_noop() {
        let db = Db::open_in_memory().await.expect("in-memory db");
        let config = crate::config::IngestionConfigBuilder::new()
            .database_url("sqlite::memory:")
            .build()
            .expect("valid config");
        let source = ScholarSource::new(std::time::Duration::from_secs(5)).expect("scholar source");
        let event_bus = EventBus::new();
        tick(&db, &config, &source, &event_bus).await.expect("tick succeeds");
    }
}
