//! Shared Cache & Single-Flight (C8).

pub mod inflight;
pub mod rate_gate;
pub mod ttl_cache;

pub use inflight::InFlightRegistry;
pub use rate_gate::{RemoteServiceGate, ScholarSlotGate};
pub use ttl_cache::build_query_fingerprint;
