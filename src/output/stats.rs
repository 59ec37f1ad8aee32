//! Statistics gathered while driving a crawl
//!
//! The driver records every orchestrator outcome here; the binary prints the
//! result once the crawl finishes.

use crate::state::{CrawlResult, VisitCounts};
use std::collections::HashMap;
use std::time::Duration;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Total number of orchestrator runs, including skipped ones
    pub runs: u64,

    /// Count of runs by result
    pub by_result: HashMap<CrawlResult, u64>,

    /// Total dispatch entries returned by successful runs
    pub dispatched: u64,

    /// Dispatch entries dropped because they were past the maximum depth
    pub depth_limited: u64,

    /// Wall-clock time the crawl took
    pub elapsed: Duration,
}

impl CrawlStatistics {
    /// Records the result of one run
    pub fn record(&mut self, result: CrawlResult) {
        self.runs += 1;
        *self.by_result.entry(result).or_insert(0) += 1;
    }

    /// Number of runs that ended with `result`
    pub fn count(&self, result: CrawlResult) -> u64 {
        self.by_result.get(&result).copied().unwrap_or(0)
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// `visits` is the registry's view at the end of the crawl, when available.
pub fn print_statistics(stats: &CrawlStatistics, visits: Option<VisitCounts>) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total runs: {}", stats.runs);
    println!("  Resources dispatched: {}", stats.dispatched);
    println!("  Dropped at depth limit: {}", stats.depth_limited);
    println!("  Elapsed: {:.1}s", stats.elapsed.as_secs_f64());
    println!();

    println!("Runs by Result:");
    for result in CrawlResult::all() {
        let count = stats.count(result);
        if count == 0 {
            continue;
        }
        let percentage = (count as f64 / stats.runs as f64) * 100.0;
        println!("  {}: {} ({:.1}%)", result, count, percentage);
    }
    println!();

    if let Some(visits) = visits {
        println!("Registry:");
        println!("  Succeeded: {}", visits.success);
        println!("  Failed: {}", visits.failure);
        println!("  Still pending: {}", visits.pending);
        println!();
    }

    let attempted = stats.count(CrawlResult::Success) + stats.count(CrawlResult::Failure);
    let success_rate = if attempted > 0 {
        (stats.count(CrawlResult::Success) as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} attempted runs succeeded)",
        success_rate,
        stats.count(CrawlResult::Success),
        attempted
    );
}
