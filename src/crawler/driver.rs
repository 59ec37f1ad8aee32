//! Crawl driver - the host's run-and-dispatch loop
//!
//! The driver starts an orchestrator for every seed, and for every successful
//! run feeds the returned dispatch entries back through the factory, until no
//! run is left. Deduplication is left entirely to the visit registry, so the
//! driver may start runs that immediately come back as `Duplicate`.

use crate::crawler::{CrawlOutcome, CrawlerFactory, CrawlerKind};
use crate::output::CrawlStatistics;
use crate::DispatchError;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

type RunResult<K> = (u32, Result<CrawlOutcome<K>, DispatchError>);

/// Drives crawls produced by a factory until no dispatched work remains
pub struct Driver<K, F> {
    factory: Arc<F>,
    max_depth: u32,
    max_concurrent_runs: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K, F> Driver<K, F>
where
    K: CrawlerKind,
    F: CrawlerFactory<K> + 'static,
{
    /// Creates a driver
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds the orchestrator for each (kind, url) pair
    /// * `max_depth` - Dispatch hops followed from a seed; seeds are depth 0
    /// * `max_concurrent_runs` - Orchestrator runs allowed in flight at once
    pub fn new(factory: Arc<F>, max_depth: u32, max_concurrent_runs: usize) -> Self {
        Self {
            factory,
            max_depth,
            max_concurrent_runs: max_concurrent_runs.max(1),
            _kind: PhantomData,
        }
    }

    /// Runs every seed and everything they dispatch
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStatistics)` - Every reachable run finished
    /// * `Err(RippleError::Dispatch)` - A crawl dispatched one resource with two
    ///   crawler kinds; remaining runs are aborted
    /// * `Err(RippleError::Task)` - A run panicked
    pub async fn run(&self, seeds: Vec<(K, Url)>) -> crate::Result<CrawlStatistics> {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_runs));
        let mut tasks: JoinSet<RunResult<K>> = JoinSet::new();
        let mut stats = CrawlStatistics::default();

        tracing::info!("Starting crawl with {} seeds", seeds.len());
        for (kind, url) in seeds {
            self.spawn_run(&mut tasks, &semaphore, kind, url, 0);
        }

        while let Some(joined) = tasks.join_next().await {
            let (depth, outcome) = joined?;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Aborting crawl: {}", e);
                    tasks.abort_all();
                    return Err(e.into());
                }
            };

            stats.record(outcome.result);

            for (url, kind) in outcome.dispatch {
                stats.dispatched += 1;
                if depth >= self.max_depth {
                    tracing::debug!("Not following {}: depth limit {} reached", url, self.max_depth);
                    stats.depth_limited += 1;
                    continue;
                }
                self.spawn_run(&mut tasks, &semaphore, kind, url, depth + 1);
            }

            if stats.runs % 100 == 0 {
                tracing::info!(
                    "Progress: {} runs finished, {} in flight",
                    stats.runs,
                    tasks.len()
                );
            }
        }

        stats.elapsed = started.elapsed();
        tracing::info!(
            "Crawl finished: {} runs ({} succeeded, {} failed) in {:.1}s",
            stats.runs,
            stats.count(crate::state::CrawlResult::Success),
            stats.count(crate::state::CrawlResult::Failure),
            stats.elapsed.as_secs_f64()
        );

        Ok(stats)
    }

    fn spawn_run(
        &self,
        tasks: &mut JoinSet<RunResult<K>>,
        semaphore: &Arc<Semaphore>,
        kind: K,
        url: Url,
        depth: u32,
    ) {
        let orchestrator = self.factory.create(kind, url);
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            // The semaphore is never closed, so a permit is always granted
            let _permit = semaphore.acquire_owned().await.ok();
            (depth, orchestrator.run().await)
        });
    }
}
