//! Visit and result definitions for crawl runs
//!
//! `CrawlResult` is what callers see; `VisitState` is what the registry stores.

use std::fmt;

/// The final result of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CrawlResult {
    /// No result has been recorded yet
    #[default]
    None,

    /// A run for this resource is in flight
    Pending,

    /// The crawl body completed without error
    Success,

    /// The crawl body failed, or the resource exhausted its retries
    Failure,

    /// The resource was already crawled or is being crawled elsewhere
    Duplicate,
}

impl CrawlResult {
    /// Returns all possible results
    pub fn all() -> [Self; 5] {
        [
            Self::None,
            Self::Pending,
            Self::Success,
            Self::Failure,
            Self::Duplicate,
        ]
    }

    /// Short lowercase name used in logs and statistics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for CrawlResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state a registry entry can be in
///
/// `None` and `Duplicate` are never stored, so they have no counterpart here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitState {
    Pending,
    Success,
    Failure,
}

impl VisitState {
    /// Returns true if no further attempt will change this state by itself
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl From<VisitState> for CrawlResult {
    fn from(state: VisitState) -> Self {
        match state {
            VisitState::Pending => CrawlResult::Pending,
            VisitState::Success => CrawlResult::Success,
            VisitState::Failure => CrawlResult::Failure,
        }
    }
}

/// Per-resource dedup record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    /// Number of admitted attempts, starting at 1
    pub visit_count: u32,

    /// Result of the latest attempt
    pub last_result: VisitState,
}

impl Visit {
    /// The record for a first, in-flight attempt
    pub fn first_attempt() -> Self {
        Self {
            visit_count: 1,
            last_result: VisitState::Pending,
        }
    }
}
