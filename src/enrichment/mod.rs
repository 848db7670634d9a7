//! Enrichment Pipeline (C9): OpenAlex title matching and arXiv identifier
//! discovery for publications already persisted by a scrape.

pub mod arxiv;
pub mod matching;
pub mod openalex;
pub mod runner;

pub use runner::{run_enrichment_pass, EnrichmentSummary};
