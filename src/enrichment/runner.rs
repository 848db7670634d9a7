//! Batched enrichment pass (C9): OpenAlex title matching + arXiv identifier
//! discovery, run as a fire-and-forget background task after a scrape.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::IngestionConfig;
use crate::db;
use crate::db::models::Publication;
use crate::db::publications::OpenAlexMatchFields;
use crate::enrichment::arxiv::{self, ArxivClient};
use crate::enrichment::matching::{self, MatchTarget};
use crate::enrichment::openalex::{self, OpenAlexClient, OpenAlexWork};
use crate::error::{ArxivError, EnrichmentError, OpenAlexError};
use crate::events::{EventBus, IngestionEvent};
use crate::utils::constants::{ENRICHMENT_BATCH_SIZE, ENRICHMENT_RATE_LIMIT_SLEEP_SECONDS, ENRICHMENT_RETRY_AFTER_DAYS};

#[derive(Debug, Clone, Default)]
pub struct EnrichmentSummary {
    pub considered: usize,
    pub matched: usize,
    pub duplicates_merged: u64,
}

/// Run one enrichment pass over `user_id`'s publications pending enrichment.
/// Never mutates `run.status`; cancellation of `run_id` aborts the pass
/// between batches and between individual publications.
pub async fn run_enrichment_pass(
    pool: &SqlitePool,
    config: &IngestionConfig,
    event_bus: &EventBus,
    user_id: i64,
    run_id: i64,
    now: DateTime<Utc>,
) -> Result<EnrichmentSummary, EnrichmentError> {
    let cooldown_threshold = now - chrono::Duration::days(ENRICHMENT_RETRY_AFTER_DAYS);
    let pending = db::publications::list_pending_enrichment(pool, user_id, cooldown_threshold).await?;
    let mut summary = EnrichmentSummary::default();
    if pending.is_empty() {
        return Ok(summary);
    }

    let settings = db::users::get_or_create_settings(pool, user_id).await?;
    let openalex = OpenAlexClient::new(
        std::time::Duration::from_secs_f64(config.arxiv_timeout_seconds().max(5.0)),
        settings.crossref_api_mailto.clone(),
        settings.openalex_api_key.clone(),
    );
    let arxiv_client = config.arxiv_enabled().then(|| {
        ArxivClient::new(
            std::time::Duration::from_secs_f64(config.arxiv_timeout_seconds()),
            config.arxiv_mailto().unwrap_or("anonymous@example.com").to_string(),
        )
    });
    let mut arxiv_disabled_for_pass = arxiv_client.is_none();

    for batch in pending.chunks(ENRICHMENT_BATCH_SIZE) {
        if db::runs::is_cancel_requested(pool, run_id).await? {
            info!(event = "enrichment_canceled", run_id, "enrichment pass canceled before batch");
            break;
        }

        let candidates = match fetch_batch_candidates(&openalex, batch).await {
            Ok(works) => works,
            Err(OpenAlexError::BudgetExhausted) => {
                warn!(event = "enrichment_budget_exhausted", run_id, "openalex daily budget exhausted");
                break;
            }
            Err(OpenAlexError::RateLimited) => {
                warn!(event = "enrichment_rate_limited", run_id, "openalex rate limited, sleeping");
                tokio::time::sleep(std::time::Duration::from_secs(ENRICHMENT_RATE_LIMIT_SLEEP_SECONDS)).await;
                continue;
            }
            Err(OpenAlexError::Request(message)) => {
                warn!(event = "enrichment_openalex_error", run_id, error = %message, "openalex request failed");
                Vec::new()
            }
        };

        for publication in batch {
            if db::runs::is_cancel_requested(pool, run_id).await? {
                info!(event = "enrichment_canceled", run_id, "enrichment pass canceled mid-batch");
                return Ok(summary);
            }
            summary.considered += 1;
            db::publications::mark_openalex_attempt(pool, publication.id, now).await?;

            sync_local_identifiers(pool, publication).await?;

            if let (false, Some(client)) = (arxiv_disabled_for_pass, &arxiv_client) {
                match discover_arxiv_identifier(pool, client, publication).await {
                    Ok(()) => {}
                    Err(ArxivError::RateLimited) => {
                        warn!(event = "arxiv_rate_limited", run_id, "disabling arxiv lookups for rest of pass");
                        arxiv_disabled_for_pass = true;
                    }
                    Err(other) => {
                        warn!(event = "arxiv_discovery_failed", run_id, error = %other, "arxiv discovery failed");
                    }
                }
            }

            if let Some(display_identifier) = db::publications::display_identifier(pool, publication.id).await? {
                event_bus.publish(
                    run_id,
                    IngestionEvent::IdentifierUpdated {
                        publication_id: publication.id,
                        display_identifier,
                    },
                );
            }

            let target = MatchTarget {
                title: publication.title_normalized.clone(),
                year: publication.year,
                author_surnames: publication
                    .author_text
                    .as_deref()
                    .map(|text| text.split(',').filter_map(|s| s.split_whitespace().last()).map(str::to_lowercase).collect())
                    .unwrap_or_default(),
            };
            if let Some(best) = matching::find_best_match(&target, &candidates) {
                apply_match(pool, publication.id, best).await?;
                summary.matched += 1;
            }
        }
    }

    summary.duplicates_merged = db::publications::sweep_identifier_duplicates(pool).await?;
    Ok(summary)
}

async fn fetch_batch_candidates(
    openalex: &OpenAlexClient,
    batch: &[Publication],
) -> Result<Vec<OpenAlexWork>, OpenAlexError> {
    let joined = batch
        .iter()
        .map(|p| openalex::sanitize_title_for_search(&p.title_raw))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("|");
    if joined.is_empty() {
        return Ok(Vec::new());
    }
    openalex.search_by_title(&joined).await
}

async fn sync_local_identifiers(pool: &SqlitePool, publication: &Publication) -> Result<(), sqlx::Error> {
    if let Some(doi) = &publication.doi {
        db::identifiers::upsert(
            pool,
            publication.id,
            "doi",
            doi,
            &doi.to_lowercase(),
            0.95,
            "scholar_link",
            None,
        )
        .await?;
    }
    Ok(())
}

async fn discover_arxiv_identifier(
    pool: &SqlitePool,
    client: &ArxivClient,
    publication: &Publication,
) -> Result<(), ArxivError> {
    let author = arxiv::author_surname(publication.author_text.as_deref());
    let Some(query) = arxiv::build_arxiv_query(&publication.title_raw, author.as_deref()) else {
        return Ok(());
    };
    let feed = client.search(&query, 3).await?;
    let Some(arxiv_id) = arxiv::first_discovered_id(&feed) else {
        return Ok(());
    };
    db::identifiers::upsert(
        pool,
        publication.id,
        "arxiv",
        &arxiv_id,
        &arxiv_id.to_lowercase(),
        0.9,
        "arxiv",
        Some(&format!("https://arxiv.org/abs/{arxiv_id}")),
    )
    .await
    .map_err(|e| ArxivError::Request(e.to_string()))
}

async fn apply_match(pool: &SqlitePool, publication_id: i64, work: &OpenAlexWork) -> Result<(), sqlx::Error> {
    if let Some(doi) = work.doi() {
        db::identifiers::upsert(pool, publication_id, "doi", &doi, &doi.to_lowercase(), 0.85, "openalex", None).await?;
    }
    if let Some(pmid) = work.pmid() {
        db::identifiers::upsert(pool, publication_id, "pmid", &pmid, &pmid.to_lowercase(), 0.8, "openalex", None).await?;
    }
    if let Some(pmcid) = work.pmcid() {
        db::identifiers::upsert(pool, publication_id, "pmcid", &pmcid, &pmcid.to_lowercase(), 0.8, "openalex", None).await?;
    }

    db::publications::apply_openalex_match(
        pool,
        publication_id,
        OpenAlexMatchFields {
            year: work.publication_year,
            citation_count: Some(work.cited_by_count),
            pdf_url: work.open_access_url().map(str::to_string),
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_defaults_to_zero() {
        let summary = EnrichmentSummary::default();
        assert_eq!(summary.considered, 0);
        assert_eq!(summary.matched, 0);
    }
}
