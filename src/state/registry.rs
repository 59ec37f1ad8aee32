use crate::state::{CrawlResult, Visit, VisitState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Total attempts, including the first, before a failing resource is given up on
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The registry's decision for a run request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller now owns the in-flight attempt and must report its result
    Admitted { attempt: u32 },

    /// The caller must not run; the result is `Duplicate` or `Failure`
    Skipped(CrawlResult),
}

impl Admission {
    /// Returns true if the caller should run the crawl
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Snapshot of how many entries are in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitCounts {
    pub pending: usize,
    pub success: usize,
    pub failure: usize,
}

/// Process-wide dedup and retry state for crawl runs
///
/// Keys are resource identities compared case-insensitively. Every admit
/// decision reads, decides and writes under the entry's shard lock, so two
/// concurrent requests for the same key can never both be admitted.
///
/// Entries are never removed implicitly. Hosts running long crawls bound
/// memory by calling [`VisitRegistry::prune_settled`], accepting that a pruned
/// resource may be crawled again if it is requested later.
#[derive(Debug)]
pub struct VisitRegistry {
    visits: DashMap<String, Visit>,
    max_retries: u32,
}

impl VisitRegistry {
    /// Creates an empty registry allowing [`DEFAULT_MAX_RETRIES`] attempts
    pub fn new() -> Self {
        Self::with_max_retries(DEFAULT_MAX_RETRIES)
    }

    /// Creates an empty registry allowing `max_retries` total attempts per resource
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            visits: DashMap::new(),
            max_retries: max_retries.max(1),
        }
    }

    /// Decides whether a run for `key` may start, recording the attempt if so
    ///
    /// # Transitions
    ///
    /// | Current entry | Decision | New entry |
    /// |---------------|----------|-----------|
    /// | none | admit | count 1, Pending |
    /// | Pending or Success | skip with `Duplicate` | unchanged |
    /// | Failure, count < max | admit | count + 1, Pending |
    /// | Failure, count >= max | skip with `Failure` | unchanged |
    pub fn begin(&self, key: &str) -> Admission {
        match self.visits.entry(canonical_key(key)) {
            Entry::Vacant(vacant) => {
                vacant.insert(Visit::first_attempt());
                Admission::Admitted { attempt: 1 }
            }
            Entry::Occupied(mut occupied) => {
                let visit = occupied.get_mut();
                match visit.last_result {
                    VisitState::Pending | VisitState::Success => {
                        Admission::Skipped(CrawlResult::Duplicate)
                    }
                    VisitState::Failure if visit.visit_count < self.max_retries => {
                        visit.visit_count += 1;
                        visit.last_result = VisitState::Pending;
                        Admission::Admitted {
                            attempt: visit.visit_count,
                        }
                    }
                    VisitState::Failure => Admission::Skipped(CrawlResult::Failure),
                }
            }
        }
    }

    /// Records the result of an admitted attempt
    ///
    /// Returns the result that was stored.
    pub fn complete(&self, key: &str, succeeded: bool) -> VisitState {
        let state = if succeeded {
            VisitState::Success
        } else {
            VisitState::Failure
        };

        match self.visits.entry(canonical_key(key)) {
            Entry::Occupied(mut occupied) => {
                let visit = occupied.get_mut();
                if visit.last_result != VisitState::Pending {
                    tracing::warn!(
                        "Completing {} which was not pending (was {:?})",
                        key,
                        visit.last_result
                    );
                }
                visit.last_result = state;
            }
            Entry::Vacant(vacant) => {
                tracing::warn!("Completing {} which has no registry entry", key);
                vacant.insert(Visit {
                    visit_count: 1,
                    last_result: state,
                });
            }
        }

        state
    }

    /// Returns a copy of the entry for `key`, if any
    pub fn visit(&self, key: &str) -> Option<Visit> {
        self.visits.get(&canonical_key(key)).map(|entry| *entry)
    }

    /// Total attempts allowed per resource
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Number of resources with an entry
    pub fn len(&self) -> usize {
        self.visits.len()
    }

    /// Returns true if no resource has been seen
    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// Counts entries by state
    pub fn counts(&self) -> VisitCounts {
        let mut counts = VisitCounts::default();
        for entry in self.visits.iter() {
            match entry.last_result {
                VisitState::Pending => counts.pending += 1,
                VisitState::Success => counts.success += 1,
                VisitState::Failure => counts.failure += 1,
            }
        }
        counts
    }

    /// Removes entries that will never be admitted again
    ///
    /// That is every `Success` entry and every `Failure` entry that has used
    /// up its attempts. Pending and retryable entries are kept. Returns the
    /// number of entries removed.
    pub fn prune_settled(&self) -> usize {
        let before = self.visits.len();
        let max_retries = self.max_retries;
        self.visits.retain(|_, visit| match visit.last_result {
            VisitState::Pending => true,
            VisitState::Success => false,
            VisitState::Failure => visit.visit_count < max_retries,
        });
        let removed = before.saturating_sub(self.visits.len());
        tracing::debug!("Pruned {} settled visits", removed);
        removed
    }
}

impl Default for VisitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn canonical_key(key: &str) -> String {
    key.to_lowercase()
}
