//! URL handling module for Ripple-Workload
//!
//! This module provides the canonical resource identity used for dedup and
//! dispatch, and the partition key used for per-host throttling.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::partition_key;
pub use normalize::normalize_url;
