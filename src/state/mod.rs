//! State module for tracking crawl admissions
//!
//! This module provides the process-wide dedup/retry state shared by every
//! crawl orchestrator.
//!
//! # Components
//!
//! - `CrawlResult`: The result of a crawl run as reported to callers
//! - `VisitState`: The subset of results a registry entry can hold
//! - `Visit`: Per-resource attempt count and last result
//! - `VisitRegistry`: Concurrency-safe map from resource identity to `Visit`

mod registry;
mod visit;

// Re-export main types
pub use registry::{Admission, VisitCounts, VisitRegistry, DEFAULT_MAX_RETRIES};
pub use visit::{CrawlResult, Visit, VisitState};
