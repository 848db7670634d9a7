//! Configuration module for the ingestion core
//!
//! Provides the `IngestionConfig` struct and its type-safe builder, covering
//! every parameter in the external-interfaces configuration surface.

pub mod builder;
pub mod types;

pub use builder::{IngestionConfigBuilder, Ready, Unconfigured};
pub use types::IngestionConfig;
