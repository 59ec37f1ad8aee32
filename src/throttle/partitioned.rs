//! Partitioned throttle with idle-partition eviction
//!
//! Keeps one `TokenBucketThrottle` per partition key (typically a host),
//! created on first use. When an idle timeout is configured, a background
//! task periodically removes and disposes partitions that have not handed
//! out a token for longer than the timeout.

use crate::throttle::{ThrottleOptions, TokenBucketThrottle};
use crate::ThrottleError;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How often the eviction task scans partitions unless told otherwise
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(10);

type Partitions = DashMap<String, Arc<TokenBucketThrottle>>;

/// Maintains separate token-bucket throttles partitioned by key
///
/// Keys are case-sensitive. Every partition shares the same `ThrottleOptions`.
pub struct PartitionedThrottle {
    options: ThrottleOptions,
    partitions: Arc<Partitions>,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PartitionedThrottle {
    /// Creates a partitioned throttle
    ///
    /// With `Some(idle_timeout)`, starts the eviction task on the current Tokio
    /// runtime using [`DEFAULT_SWEEP_PERIOD`].
    pub fn new(options: ThrottleOptions, idle_timeout: Option<Duration>) -> Self {
        Self::with_sweep_period(options, idle_timeout, DEFAULT_SWEEP_PERIOD)
    }

    /// Creates a partitioned throttle whose eviction task wakes every `sweep_period`
    pub fn with_sweep_period(
        options: ThrottleOptions,
        idle_timeout: Option<Duration>,
        sweep_period: Duration,
    ) -> Self {
        let partitions = Arc::new(Partitions::new());
        let cancel = CancellationToken::new();

        let sweeper = idle_timeout.map(|timeout| {
            tracing::debug!(
                "Starting partition sweep every {:?} (idle timeout {:?})",
                sweep_period,
                timeout
            );
            tokio::spawn(sweep_loop(
                partitions.clone(),
                timeout,
                sweep_period,
                cancel.clone(),
            ))
        });

        Self {
            options,
            partitions,
            idle_timeout,
            cancel,
            sweeper: Mutex::new(sweeper),
            closed: AtomicBool::new(false),
        }
    }

    /// Runs a unit of work under the throttle for `partition_key`
    ///
    /// The partition's throttle is created if this is the first request for
    /// the key. Concurrent first requests all observe the same throttle.
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The unit of work's output
    /// * `Err(ThrottleError::Overflow)` - The partition's wait queue is full
    /// * `Err(ThrottleError::Disposed)` - The throttle has been shut down
    pub async fn run<F, Fut, T>(
        &self,
        partition_key: &str,
        unit_of_work: F,
    ) -> Result<T, ThrottleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let throttle = self.partition(partition_key)?;
        throttle.run(unit_of_work).await
    }

    /// Gets or creates the throttle for a key
    ///
    /// The returned handle keeps the partition from being evicted until dropped.
    fn partition(&self, partition_key: &str) -> Result<Arc<TokenBucketThrottle>, ThrottleError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ThrottleError::Disposed);
        }

        let throttle = self
            .partitions
            .entry(partition_key.to_string())
            .or_insert_with(|| {
                tracing::debug!("Adding throttle for key [{}]", partition_key);
                Arc::new(TokenBucketThrottle::new(self.options.clone()))
            })
            .clone();

        self.reject_if_closed(partition_key, throttle)
    }

    /// Undoes an insert that landed after `shutdown` drained the map
    fn reject_if_closed(
        &self,
        partition_key: &str,
        throttle: Arc<TokenBucketThrottle>,
    ) -> Result<Arc<TokenBucketThrottle>, ThrottleError> {
        if !self.closed.load(Ordering::Acquire) {
            return Ok(throttle);
        }

        if let Some((_, orphan)) = self.partitions.remove(partition_key) {
            orphan.dispose();
        }
        throttle.dispose();
        tracing::debug!("Discarded throttle for key [{}] created during shutdown", partition_key);

        Err(ThrottleError::Disposed)
    }

    /// Runs one eviction pass immediately
    ///
    /// Returns the keys that were removed. Does nothing when no idle timeout
    /// was configured.
    pub fn sweep(&self) -> Vec<String> {
        match self.idle_timeout {
            Some(timeout) => evict_idle(&self.partitions, timeout),
            None => Vec::new(),
        }
    }

    /// Number of live partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Whether a partition currently exists for the key
    pub fn contains(&self, partition_key: &str) -> bool {
        self.partitions.contains_key(partition_key)
    }

    /// The options shared by every partition
    pub fn options(&self) -> &ThrottleOptions {
        &self.options
    }

    /// Stops the eviction task and disposes every remaining partition
    ///
    /// Waits for the eviction task to finish before touching partitions.
    /// Later calls return immediately, and later `run` calls fail with
    /// `ThrottleError::Disposed`.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.cancel.cancel();

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!("Partition sweep task ended abnormally: {}", e);
                }
            }
        }

        let keys: Vec<String> = self
            .partitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if let Some((_, throttle)) = self.partitions.remove(&key) {
                throttle.dispose();
            }
        }

        tracing::debug!("Partitioned throttle shut down");
    }
}

impl Drop for PartitionedThrottle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn sweep_loop(
    partitions: Arc<Partitions>,
    idle_timeout: Duration,
    period: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {
                evict_idle(&partitions, idle_timeout);
            }
        }
    }
}

fn is_expired(throttle: &TokenBucketThrottle, idle_timeout: Duration) -> bool {
    throttle
        .idle_duration()
        .is_some_and(|idle| idle > idle_timeout)
}

/// Removes and disposes partitions idle for longer than `idle_timeout`
///
/// A partition is only removed while the map holds the sole handle to it.
/// Callers clone their handle under the same shard lock `remove_if` takes, so
/// a throttle is never disposed while a `run` is acquiring or holding a lease.
fn evict_idle(partitions: &Partitions, idle_timeout: Duration) -> Vec<String> {
    let candidates: Vec<String> = partitions
        .iter()
        .filter(|entry| is_expired(entry.value(), idle_timeout))
        .map(|entry| entry.key().clone())
        .collect();

    let mut evicted = Vec::new();
    for key in candidates {
        let removed = partitions.remove_if(&key, |_, throttle| {
            Arc::strong_count(throttle) == 1 && is_expired(throttle, idle_timeout)
        });

        if let Some((key, throttle)) = removed {
            tracing::debug!("Removing partition throttle [{}]", key);
            throttle.dispose();
            evicted.push(key);
        }
    }

    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinSet;

    fn test_options() -> ThrottleOptions {
        ThrottleOptions::new(5, 5, Duration::from_secs(1)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_partitions_created_lazily() {
        let throttle = PartitionedThrottle::new(test_options(), None);
        assert_eq!(throttle.partition_count(), 0);

        let value = throttle.run("example.com", || async { 7 }).await.unwrap();
        assert_eq!(value, 7);
        assert!(throttle.contains("example.com"));

        throttle.run("example.com", || async {}).await.unwrap();
        assert_eq!(throttle.partition_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_case_sensitive() {
        let throttle = PartitionedThrottle::new(test_options(), None);
        throttle.run("example.com", || async {}).await.unwrap();
        throttle.run("EXAMPLE.COM", || async {}).await.unwrap();
        assert_eq!(throttle.partition_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_use_creates_one_partition() {
        let options = ThrottleOptions::new(20, 0, Duration::from_secs(60)).unwrap();
        let throttle = Arc::new(PartitionedThrottle::new(options, None));

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let throttle = throttle.clone();
            tasks.spawn(async move { throttle.run("shared.example", || async {}).await });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        assert_eq!(throttle.partition_count(), 1);
        let partition = throttle.partition("shared.example").unwrap();
        assert_eq!(partition.available_tokens(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partitions_share_options_but_not_tokens() {
        let options = ThrottleOptions::new(1, 0, Duration::from_secs(60)).unwrap();
        let throttle = PartitionedThrottle::new(options, None);

        throttle.run("a.example", || async {}).await.unwrap();
        assert!(throttle.run("b.example", || async {}).await.is_ok());
        assert_eq!(
            throttle.run("a.example", || async {}).await,
            Err(ThrottleError::Overflow { limit: 0 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_idle_partitions() {
        let throttle = PartitionedThrottle::with_sweep_period(
            test_options(),
            Some(Duration::from_secs(5)),
            Duration::from_secs(3600),
        );

        throttle.run("stale.example", || async {}).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        throttle.run("fresh.example", || async {}).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let evicted = throttle.sweep();
        assert_eq!(evicted, vec!["stale.example".to_string()]);
        assert!(!throttle.contains("stale.example"));
        assert!(throttle.contains("fresh.example"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_removes_idle_partition() {
        let throttle = PartitionedThrottle::with_sweep_period(
            test_options(),
            Some(Duration::from_secs(2)),
            Duration::from_secs(1),
        );

        throttle.run("idle.example", || async {}).await.unwrap();
        assert!(throttle.contains("idle.example"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!throttle.contains("idle.example"));

        throttle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_skips_partition_in_use() {
        let throttle = Arc::new(PartitionedThrottle::with_sweep_period(
            test_options(),
            Some(Duration::from_secs(5)),
            Duration::from_secs(3600),
        ));

        let worker = {
            let throttle = throttle.clone();
            tokio::spawn(async move {
                throttle
                    .run("slow.example", || async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(throttle.sweep().is_empty());
        assert!(throttle.contains("slow.example"));

        worker.await.unwrap().unwrap();
        assert_eq!(throttle.sweep(), vec!["slow.example".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_without_timeout_is_noop() {
        let throttle = PartitionedThrottle::new(test_options(), None);
        throttle.run("example.com", || async {}).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert!(throttle.sweep().is_empty());
        assert_eq!(throttle.partition_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disposes_all_partitions() {
        let throttle = PartitionedThrottle::new(test_options(), Some(Duration::from_secs(30)));
        let mut handles = Vec::new();
        for key in ["a.example", "b.example", "c.example"] {
            throttle.run(key, || async {}).await.unwrap();
            handles.push(throttle.partition(key).unwrap());
        }

        throttle.shutdown().await;
        throttle.shutdown().await;

        assert_eq!(throttle.partition_count(), 0);
        assert!(handles.iter().all(|handle| handle.is_disposed()));
        assert_eq!(
            throttle.run("a.example", || async {}).await,
            Err(ThrottleError::Disposed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_partition_inserted_after_shutdown_drain_is_disposed() {
        let throttle = PartitionedThrottle::new(test_options(), None);
        throttle.shutdown().await;

        // A caller that passed the closed check before shutdown, then inserted
        let late = Arc::new(TokenBucketThrottle::new(test_options()));
        throttle
            .partitions
            .insert("late.example".to_string(), late.clone());

        let result = throttle.reject_if_closed("late.example", late.clone());
        assert!(matches!(result, Err(ThrottleError::Disposed)));
        assert!(late.is_disposed());
        assert_eq!(throttle.partition_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_runs_racing_shutdown_leave_no_partitions() {
        for _ in 0..50 {
            let throttle = Arc::new(PartitionedThrottle::new(test_options(), None));

            let mut tasks = JoinSet::new();
            for i in 0..8 {
                let throttle = throttle.clone();
                tasks.spawn(async move {
                    let key = format!("host{}.example", i % 4);
                    throttle.run(&key, || async {}).await
                });
            }
            throttle.shutdown().await;

            while let Some(joined) = tasks.join_next().await {
                let result = joined.unwrap();
                assert!(matches!(
                    result,
                    Ok(()) | Err(ThrottleError::Disposed) | Err(ThrottleError::Overflow { .. })
                ));
            }

            assert_eq!(throttle.partition_count(), 0);
            assert_eq!(
                throttle.run("host0.example", || async {}).await,
                Err(ThrottleError::Disposed)
            );
        }
    }
}
