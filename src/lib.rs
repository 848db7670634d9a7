//! Scholar profile ingestion core.
//!
//! Crawls Google Scholar author pages, dedups and persists publications,
//! enriches them against OpenAlex/arXiv, and exposes run progress over an
//! in-process event bus. Single-binary service: [`db::Db`] owns the SQLite
//! pool, [`scheduler::run`] drives the background ticker, and
//! [`run_engine::start_run`] is the entry point for both manual and
//! scheduled runs.

pub mod cache;
pub mod config;
pub mod continuation_queue;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod paged_fetcher;
pub mod parser;
pub mod run_engine;
pub mod safety;
pub mod scheduler;
pub mod scholar_source;
pub mod utils;

pub use config::IngestionConfig;
pub use db::Db;
pub use error::{IngestionError, RunStartError};
pub use events::{EventBus, IngestionEvent};
pub use run_engine::{RunOptions, RunSummary};
pub use scholar_source::ScholarSource;
