// Scholar profile ingestion daemon.
//
// Runs the background scheduler: drains due continuation-queue jobs and
// kicks off scheduled user runs on a fixed tick. Manual runs and the SSE
// event stream are driven by the embedding HTTP layer via this crate's
// library API; this binary only owns the scheduler loop and a clean
// shutdown path.

use std::env;
use std::time::Duration;

use scholarr_ingestion::config::IngestionConfigBuilder;
use scholarr_ingestion::{db::Db, events::EventBus, scheduler, scholar_source::ScholarSource};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = env::var("INGESTION_DATABASE_URL").unwrap_or_else(|_| "sqlite://ingestion.db".to_string());
    let config = build_config(&database_url)?;

    let db = Db::open(config.database_url()).await?;
    let source = ScholarSource::new(Duration::from_secs(30))?;
    let event_bus = EventBus::new();

    tracing::info!(event = "ingestion_daemon_start", database_url = %database_url, "starting scholar ingestion daemon");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler_task = tokio::spawn(scheduler::run(db, config, source, event_bus, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!(event = "ingestion_daemon_shutdown", "received shutdown signal");
    let _ = shutdown_tx.send(());
    let _ = scheduler_task.await;

    Ok(())
}

fn build_config(database_url: &str) -> anyhow::Result<scholarr_ingestion::IngestionConfig> {
    let mut builder = IngestionConfigBuilder::new().database_url(database_url);

    if let Ok(value) = env::var("INGESTION_REQUEST_DELAY_SECONDS") {
        builder = builder.request_delay_seconds(value.parse()?);
    }
    if let Ok(value) = env::var("INGESTION_RUN_INTERVAL_MINUTES") {
        builder = builder.run_interval_minutes(value.parse()?);
    }
    if let Ok(value) = env::var("INGESTION_ARXIV_MAILTO") {
        builder = builder.arxiv_mailto(value);
    }
    if let Ok(value) = env::var("INGESTION_OPENALEX_API_KEY") {
        builder = builder.openalex_api_key(value);
    }
    if let Ok(value) = env::var("INGESTION_CROSSREF_MAILTO") {
        builder = builder.crossref_api_mailto(value);
    }

    Ok(builder.build()?)
}
