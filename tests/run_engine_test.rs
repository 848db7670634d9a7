//! End-to-end coverage of C5 (run engine) against a mocked Scholar origin:
//! fetch -> parse -> fingerprint/dedup -> persist -> event publish.

mod common;

use std::time::Duration;

use mockito::Matcher;
use scholarr_ingestion::config::IngestionConfigBuilder;
use scholarr_ingestion::db::models::RunStatus;
use scholarr_ingestion::events::EventBus;
use scholarr_ingestion::run_engine::{self, RunOptions};
use scholarr_ingestion::scholar_source::ScholarSource;

#[tokio::test]
async fn single_scholar_run_persists_new_publication() {
    let mut server = mockito::Server::new_async().await;
    let html = common::single_publication_profile_html("testScholar1", "abcXYZ", "A Test Paper");
    let _mock = server
        .mock("GET", "/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(html)
        .create_async()
        .await;

    let db = common::open_memory_db().await;
    let user_id = common::seed_user(&db.pool, "jane@example.com").await;
    let scholar_id = common::seed_scholar(&db.pool, user_id, "testScholar1").await;

    let config = IngestionConfigBuilder::new()
        .database_url("sqlite::memory:")
        .arxiv_enabled(false)
        .build()
        .expect("valid config");
    let source = ScholarSource::with_base_url(Duration::from_secs(5), server.url()).expect("client builds");
    let event_bus = EventBus::new();

    let summary = run_engine::start_run(&db, &config, &source, &event_bus, user_id, RunOptions::default(), common::now())
        .await
        .expect("run starts and completes");

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.scholar_count, 1);
    assert_eq!(summary.succeeded_count, 1);
    assert_eq!(summary.failed_count, 0);
    assert_eq!(summary.new_publication_count, 1);

    let (title_raw, citation_count, year, cluster_id): (String, i64, Option<i64>, Option<String>) = sqlx::query_as(
        "SELECT title_raw, citation_count, year, cluster_id FROM publications",
    )
    .fetch_one(&db.pool)
    .await
    .expect("one publication row persisted");
    assert_eq!(title_raw, "A Test Paper");
    assert_eq!(citation_count, 5);
    assert_eq!(year, Some(2023));
    assert_eq!(cluster_id.as_deref(), Some("cfv:testScholar1:abcXYZ"));

    let link_count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM scholar_publications WHERE scholar_profile_id = ?",
    )
    .bind(scholar_id)
    .fetch_one(&db.pool)
    .await
    .expect("link query succeeds");
    assert_eq!(link_count.0, 1);

    let scholar_row: (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT display_name, last_run_status FROM scholar_profiles WHERE id = ?",
    )
    .bind(scholar_id)
    .fetch_one(&db.pool)
    .await
    .expect("scholar row exists");
    assert_eq!(scholar_row.0.as_deref(), Some("Jane Researcher"));
    assert_eq!(scholar_row.1.as_deref(), Some("success"));
}

#[tokio::test]
async fn scholar_with_no_results_page_completes_with_zero_new_publications() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(common::no_results_profile_html())
        .create_async()
        .await;

    let db = common::open_memory_db().await;
    let user_id = common::seed_user(&db.pool, "noresults@example.com").await;
    common::seed_scholar(&db.pool, user_id, "emptyScholar").await;

    let config = IngestionConfigBuilder::new()
        .database_url("sqlite::memory:")
        .arxiv_enabled(false)
        .build()
        .expect("valid config");
    let source = ScholarSource::with_base_url(Duration::from_secs(5), server.url()).expect("client builds");
    let event_bus = EventBus::new();

    let summary = run_engine::start_run(&db, &config, &source, &event_bus, user_id, RunOptions::default(), common::now())
        .await
        .expect("run starts and completes");

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.new_publication_count, 0);

    let pub_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM publications")
        .fetch_one(&db.pool)
        .await
        .expect("count query succeeds");
    assert_eq!(pub_count.0, 0);
}

/// A scholar whose page 1 has a show-more button triggers `MaxPagesReached`
/// in pass 1 (classified `Partial`); pass 2 then follows the continuation to
/// page 2, which finishes `Exhausted` (classified `Success`). The final
/// tallies must reflect only the scholar's last-recorded outcome, not the
/// sum of both passes' classifications.
#[tokio::test]
async fn scholar_resolved_across_two_passes_is_not_double_tallied() {
    let mut server = mockito::Server::new_async().await;
    let (page_one, page_two) = common::two_page_profile_html("pagedScholar");
    let _mock_page_one = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("cstart".into(), "0".into()))
        .with_status(200)
        .with_body(page_one)
        .create_async()
        .await;
    let _mock_page_two = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("cstart".into(), "1".into()))
        .with_status(200)
        .with_body(page_two)
        .create_async()
        .await;

    let db = common::open_memory_db().await;
    let user_id = common::seed_user(&db.pool, "paged@example.com").await;
    common::seed_scholar(&db.pool, user_id, "pagedScholar").await;

    let config = IngestionConfigBuilder::new()
        .database_url("sqlite::memory:")
        .arxiv_enabled(false)
        .ingestion_max_pages_per_scholar(3)
        .build()
        .expect("valid config");
    let source = ScholarSource::with_base_url(Duration::from_secs(5), server.url()).expect("client builds");
    let event_bus = EventBus::new();

    let summary = run_engine::start_run(&db, &config, &source, &event_bus, user_id, RunOptions::default(), common::now())
        .await
        .expect("run starts and completes");

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.scholar_count, 1);
    assert_eq!(summary.succeeded_count, 1);
    assert_eq!(summary.partial_count, 0, "pass 1's partial classification must be superseded, not added to");
    assert_eq!(summary.failed_count, 0);
    assert_eq!(summary.new_publication_count, 2);

    let pub_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM publications")
        .fetch_one(&db.pool)
        .await
        .expect("count query succeeds");
    assert_eq!(pub_count.0, 2);
}

#[tokio::test]
async fn second_concurrent_run_for_same_user_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let html = common::single_publication_profile_html("testScholar2", "defUVW", "Another Paper");
    let _mock = server
        .mock("GET", "/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(html)
        .create_async()
        .await;

    let db = common::open_memory_db().await;
    let user_id = common::seed_user(&db.pool, "busy@example.com").await;
    common::seed_scholar(&db.pool, user_id, "testScholar2").await;

    let config = IngestionConfigBuilder::new()
        .database_url("sqlite::memory:")
        .arxiv_enabled(false)
        .build()
        .expect("valid config");
    let source = ScholarSource::with_base_url(Duration::from_secs(5), server.url()).expect("client builds");
    let event_bus = EventBus::new();

    // Hold the advisory lock directly, simulating a run already in flight.
    let _guard = db.advisory_locks.try_acquire(user_id).await.expect("lock acquired");

    let err = run_engine::start_run(&db, &config, &source, &event_bus, user_id, RunOptions::default(), common::now())
        .await
        .expect_err("second run must be rejected while the lock is held");
    assert!(matches!(err, scholarr_ingestion::error::RunStartError::AlreadyInProgress));
}
