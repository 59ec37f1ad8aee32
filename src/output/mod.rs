//! Output module for crawl summaries
//!
//! This module handles recording run results while a crawl is driven and
//! printing them once it finishes.

pub mod stats;

pub use stats::{print_statistics, CrawlStatistics};
