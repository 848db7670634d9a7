//! End-to-end coverage of C10 (scheduler) against a mocked Scholar origin:
//! draining a due continuation-queue job and dispatching a due scheduled run.

mod common;

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use mockito::Matcher;
use scholarr_ingestion::config::IngestionConfigBuilder;
use scholarr_ingestion::continuation_queue;
use scholarr_ingestion::events::EventBus;
use scholarr_ingestion::scheduler;
use scholarr_ingestion::scholar_source::ScholarSource;

#[tokio::test]
async fn tick_dispatches_a_due_continuation_queue_job() {
    let mut server = mockito::Server::new_async().await;
    let html = common::single_publication_profile_html("queuedScholar", "qqqRRR", "Queued Paper");
    let _mock = server
        .mock("GET", "/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(html)
        .create_async()
        .await;

    let db = common::open_memory_db().await;
    let user_id = common::seed_user(&db.pool, "queue@example.com").await;
    let scholar_profile_id = common::seed_scholar(&db.pool, user_id, "queuedScholar").await;

    let seeded_at = common::now() - ChronoDuration::seconds(60);
    continuation_queue::upsert_job(&db.pool, user_id, scholar_profile_id, 0, "max_pages_reached", 0, seeded_at)
        .await
        .expect("queue job seeded");

    let config = IngestionConfigBuilder::new()
        .database_url("sqlite::memory:")
        .arxiv_enabled(false)
        .build()
        .expect("valid config");
    let source = ScholarSource::with_base_url(Duration::from_secs(5), server.url()).expect("client builds");
    let event_bus = EventBus::new();

    scheduler::tick(&db, &config, &source, &event_bus).await.expect("tick succeeds");

    let remaining_jobs: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingestion_queue_items")
        .fetch_one(&db.pool)
        .await
        .expect("count query succeeds");
    assert_eq!(remaining_jobs.0, 0, "dispatched job should be cleared on success");

    let pub_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM publications")
        .fetch_one(&db.pool)
        .await
        .expect("count query succeeds");
    assert_eq!(pub_count.0, 1);
}

#[tokio::test]
async fn tick_dispatches_a_due_scheduled_run() {
    let mut server = mockito::Server::new_async().await;
    let html = common::single_publication_profile_html("autoScholar", "aaaBBB", "Auto Run Paper");
    let _mock = server
        .mock("GET", "/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(html)
        .create_async()
        .await;

    let db = common::open_memory_db().await;
    let user_id = common::seed_user(&db.pool, "auto@example.com").await;
    common::seed_scholar(&db.pool, user_id, "autoScholar").await;
    common::enable_auto_run(&db.pool, user_id).await;

    let config = IngestionConfigBuilder::new()
        .database_url("sqlite::memory:")
        .arxiv_enabled(false)
        .build()
        .expect("valid config");
    let source = ScholarSource::with_base_url(Duration::from_secs(5), server.url()).expect("client builds");
    let event_bus = EventBus::new();

    scheduler::tick(&db, &config, &source, &event_bus).await.expect("tick succeeds");

    let run_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawl_runs WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&db.pool)
        .await
        .expect("count query succeeds");
    assert_eq!(run_count.0, 1, "a scheduled run should have been created");

    let last_run_start: (Option<chrono::DateTime<chrono::Utc>>,) =
        sqlx::query_as("SELECT last_run_start FROM user_settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&db.pool)
            .await
            .expect("settings row exists");
    assert!(last_run_start.0.is_some());
}
