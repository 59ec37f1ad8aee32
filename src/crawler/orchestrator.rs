//! Crawl orchestrator - admission, execution and dispatch recording for one resource
//!
//! An orchestrator is bound to a single entrypoint. Running it asks the shared
//! `VisitRegistry` whether the resource may be crawled, runs the crawl body if
//! admitted, and reports the body's result back to the registry.

use crate::state::{Admission, CrawlResult, VisitRegistry};
use crate::DispatchError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// Tag naming the crawler that should handle a dispatched resource
///
/// Implemented for any small, comparable, printable type; in practice a
/// closed enum known to the `CrawlerFactory`.
pub trait CrawlerKind:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

impl<T> CrawlerKind for T where
    T: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// What a run reports back to its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome<K> {
    /// The final result of the run
    pub result: CrawlResult,

    /// Resources the crawl asked to have crawled next, and by which crawler.
    /// Empty unless `result` is `Success`.
    pub dispatch: HashMap<Url, K>,
}

impl<K> CrawlOutcome<K> {
    /// An outcome carrying no follow-up work
    pub fn without_dispatch(result: CrawlResult) -> Self {
        Self {
            result,
            dispatch: HashMap::new(),
        }
    }

    /// Returns true if the crawl body ran and completed
    pub fn is_success(&self) -> bool {
        self.result == CrawlResult::Success
    }

    /// Returns true if the run was skipped as already done or in flight
    pub fn is_duplicate(&self) -> bool {
        self.result == CrawlResult::Duplicate
    }
}

struct DispatchState<K> {
    requested: HashMap<Url, K>,
    conflict: Option<DispatchError>,
}

/// Handle a crawl body uses to request follow-up crawls
///
/// Clones share the same per-run mapping. The first conflicting request is
/// remembered, so the run aborts even if the body discards the error.
#[derive(Clone)]
pub struct Dispatch<K> {
    state: Arc<Mutex<DispatchState<K>>>,
}

impl<K: CrawlerKind> Dispatch<K> {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DispatchState {
                requested: HashMap::new(),
                conflict: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState<K>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Requests that `url` be crawled next by a crawler of type `kind`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Recorded, or already recorded with the same kind
    /// * `Err(DispatchError::Ambiguous)` - Already requested with a different kind
    pub fn dispatch(&self, url: Url, kind: K) -> Result<(), DispatchError> {
        let mut state = self.lock();

        match state.requested.get(&url).copied() {
            Some(existing) if existing == kind => Ok(()),
            Some(existing) => {
                let conflict = DispatchError::Ambiguous {
                    url: url.to_string(),
                    existing: existing.to_string(),
                    requested: kind.to_string(),
                };
                state.conflict.get_or_insert_with(|| conflict.clone());
                Err(conflict)
            }
            None => {
                state.requested.insert(url, kind);
                Ok(())
            }
        }
    }

    /// Returns true if `url` has been requested in this run
    pub fn contains(&self, url: &Url) -> bool {
        self.lock().requested.contains_key(url)
    }

    /// Number of distinct resources requested so far
    pub fn len(&self) -> usize {
        self.lock().requested.len()
    }

    /// Returns true if nothing has been requested
    pub fn is_empty(&self) -> bool {
        self.lock().requested.is_empty()
    }

    fn finish(&self) -> Result<HashMap<Url, K>, DispatchError> {
        let mut state = self.lock();
        match state.conflict.take() {
            Some(conflict) => Err(conflict),
            None => Ok(std::mem::take(&mut state.requested)),
        }
    }
}

/// The work an orchestrator runs once admitted
///
/// Any error returned is treated as a failed attempt and counted against the
/// resource's retry budget.
#[async_trait]
pub trait CrawlBody<K: CrawlerKind>: Send + Sync {
    async fn crawl(&self, entrypoint: &Url, dispatch: Dispatch<K>) -> anyhow::Result<()>;
}

#[async_trait]
impl<K, F, Fut> CrawlBody<K> for F
where
    K: CrawlerKind,
    F: Fn(Url, Dispatch<K>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn crawl(&self, entrypoint: &Url, dispatch: Dispatch<K>) -> anyhow::Result<()> {
        (self)(entrypoint.clone(), dispatch).await
    }
}

/// Marks an admitted attempt failed if it is dropped before being finished
///
/// Covers runs whose future is cancelled or whose body panics, which would
/// otherwise leave the resource `Pending` forever.
struct PendingVisit<'a> {
    registry: &'a VisitRegistry,
    key: &'a str,
    finished: bool,
}

impl<'a> PendingVisit<'a> {
    fn new(registry: &'a VisitRegistry, key: &'a str) -> Self {
        Self {
            registry,
            key,
            finished: false,
        }
    }

    fn finish(mut self, succeeded: bool) {
        self.finished = true;
        self.registry.complete(self.key, succeeded);
    }
}

impl Drop for PendingVisit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Crawl of {} was abandoned; recording failure", self.key);
            self.registry.complete(self.key, false);
        }
    }
}

/// Runs one crawl of one resource under the shared visit registry
pub struct CrawlOrchestrator<K: CrawlerKind> {
    registry: Arc<VisitRegistry>,
    entrypoint: Url,
    body: Arc<dyn CrawlBody<K>>,
}

impl<K: CrawlerKind> CrawlOrchestrator<K> {
    /// Creates an orchestrator for `entrypoint` running `body`
    pub fn new(registry: Arc<VisitRegistry>, entrypoint: Url, body: Arc<dyn CrawlBody<K>>) -> Self {
        Self {
            registry,
            entrypoint,
            body,
        }
    }

    /// Creates an orchestrator whose body is a closure
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ripple_workload::crawler::{CrawlOrchestrator, PageKind};
    /// use ripple_workload::state::VisitRegistry;
    /// use std::sync::Arc;
    /// use url::Url;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let registry = Arc::new(VisitRegistry::new());
    /// let entrypoint = Url::parse("https://example.com/")?;
    /// let orchestrator = CrawlOrchestrator::from_fn(registry, entrypoint, |url, dispatch| async move {
    ///     dispatch.dispatch(url.join("/about")?, PageKind::Site)?;
    ///     anyhow::Ok(())
    /// });
    /// let outcome = orchestrator.run().await?;
    /// assert_eq!(outcome.dispatch.len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_fn<F, Fut>(registry: Arc<VisitRegistry>, entrypoint: Url, body: F) -> Self
    where
        F: Fn(Url, Dispatch<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(registry, entrypoint, Arc::new(body))
    }

    /// The resource this orchestrator crawls
    pub fn entrypoint(&self) -> &Url {
        &self.entrypoint
    }

    /// Runs the crawl if the registry admits it
    ///
    /// Crawl body failures never escape: they are recorded in the registry and
    /// reported as `CrawlResult::Failure`.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - `Success` with its dispatch map, `Failure`, or `Duplicate`
    /// * `Err(DispatchError)` - The body requested one resource with two crawler kinds
    pub async fn run(&self) -> Result<CrawlOutcome<K>, DispatchError> {
        let key = self.entrypoint.as_str();

        let attempt = match self.registry.begin(key) {
            Admission::Admitted { attempt } => attempt,
            Admission::Skipped(result) => {
                tracing::debug!("Skipping {}: {}", key, result);
                return Ok(CrawlOutcome::without_dispatch(result));
            }
        };

        tracing::debug!("Crawling {} (attempt {})", key, attempt);
        let pending = PendingVisit::new(&self.registry, key);

        let dispatch = Dispatch::new();
        let crawled = self.body.crawl(&self.entrypoint, dispatch.clone()).await;

        match (crawled, dispatch.finish()) {
            (_, Err(conflict)) => {
                pending.finish(false);
                tracing::error!("Aborting crawl of {}: {}", key, conflict);
                Err(conflict)
            }
            (Err(e), Ok(_)) => {
                pending.finish(false);
                tracing::warn!("Crawl of {} failed on attempt {}: {:#}", key, attempt, e);
                Ok(CrawlOutcome::without_dispatch(CrawlResult::Failure))
            }
            (Ok(()), Ok(requested)) => {
                pending.finish(true);
                tracing::debug!(
                    "Crawled {}, dispatching {} resources",
                    key,
                    requested.len()
                );
                Ok(CrawlOutcome {
                    result: CrawlResult::Success,
                    dispatch: requested,
                })
            }
        }
    }
}
