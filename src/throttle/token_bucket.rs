//! Token-bucket throttle for a single partition
//!
//! The bucket starts full. Every interval a background task tops it back up
//! and hands tokens to queued requests, oldest first. Finishing a unit of work
//! never returns a token.

use crate::throttle::ThrottleOptions;
use crate::ThrottleError;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Proof that a token was acquired from a throttle
///
/// Dropping a lease does not return its token to the bucket.
#[derive(Debug)]
pub struct Lease {
    acquired_at: Instant,
}

impl Lease {
    /// When the token backing this lease was handed out
    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }
}

struct BucketState {
    tokens: usize,
    waiters: VecDeque<oneshot::Sender<Instant>>,
    last_acquired: Instant,
    disposed: bool,
}

impl BucketState {
    /// Drops waiters whose request future has already been abandoned
    fn prune_abandoned(&mut self) {
        self.waiters.retain(|waiter| !waiter.is_closed());
    }

    /// Hands available tokens to queued requests, oldest first
    fn serve_waiters(&mut self) {
        while self.tokens > 0 {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };

            let now = Instant::now();
            if waiter.send(now).is_ok() {
                self.tokens -= 1;
                self.last_acquired = now;
            }
        }
    }
}

/// A queued request's end of the channel
///
/// If the request is dropped after a token was sent but before it was
/// received, the token goes back to the bucket.
struct QueuedRequest<'a> {
    bucket: &'a Bucket,
    receiver: oneshot::Receiver<Instant>,
    settled: bool,
}

impl QueuedRequest<'_> {
    async fn wait(&mut self) -> Result<Instant, ThrottleError> {
        let result = (&mut self.receiver).await;
        self.settled = true;
        result.map_err(|_| ThrottleError::Disposed)
    }
}

impl Drop for QueuedRequest<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        self.receiver.close();
        if self.receiver.try_recv().is_ok() {
            self.bucket.return_token();
        }
    }
}

struct Bucket {
    options: ThrottleOptions,
    state: Mutex<BucketState>,
}

impl Bucket {
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn replenish(&self) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }

        // A refill is always a full bucket's worth
        state.tokens = self.options.max_concurrent();
        state.serve_waiters();

        tracing::trace!(
            "Replenished bucket: {} tokens available, {} queued",
            state.tokens,
            state.waiters.len()
        );
    }

    /// Puts back a token that was handed to a request which went away before using it
    fn return_token(&self) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }

        state.tokens = state
            .tokens
            .saturating_add(1)
            .min(self.options.max_concurrent());
        state.serve_waiters();

        tracing::trace!("Returned unused token: {} available", state.tokens);
    }
}

/// Admission control for one partition using a replenishing token bucket
///
/// Safe to share between tasks; all methods take `&self`. Constructing a
/// throttle spawns its replenishment task, so it must happen inside a Tokio
/// runtime.
pub struct TokenBucketThrottle {
    bucket: Arc<Bucket>,
    shutdown: CancellationToken,
}

impl TokenBucketThrottle {
    /// Creates a full bucket and starts auto-replenishment
    pub fn new(options: ThrottleOptions) -> Self {
        let interval = options.interval();
        let bucket = Arc::new(Bucket {
            state: Mutex::new(BucketState {
                tokens: options.max_concurrent(),
                waiters: VecDeque::new(),
                last_acquired: Instant::now(),
                disposed: false,
            }),
            options,
        });

        let shutdown = CancellationToken::new();
        tokio::spawn(replenish_loop(
            Arc::downgrade(&bucket),
            interval,
            shutdown.clone(),
        ));

        Self { bucket, shutdown }
    }

    /// Acquires one token, waiting in the FIFO queue if the bucket is empty
    ///
    /// # Returns
    ///
    /// * `Ok(Lease)` - A token was acquired
    /// * `Err(ThrottleError::Overflow)` - The wait queue is already full
    /// * `Err(ThrottleError::Disposed)` - The throttle was disposed before or while waiting
    pub async fn acquire(&self) -> Result<Lease, ThrottleError> {
        let receiver = {
            let mut state = self.bucket.lock();
            if state.disposed {
                return Err(ThrottleError::Disposed);
            }

            state.prune_abandoned();

            // Queued requests are served before newcomers, even if a token is free
            if state.waiters.is_empty() && state.tokens > 0 {
                let now = Instant::now();
                state.tokens -= 1;
                state.last_acquired = now;
                return Ok(Lease { acquired_at: now });
            }

            let limit = self.bucket.options.max_queued();
            if state.waiters.len() >= limit {
                tracing::warn!("Throttle queue full ({} waiting), rejecting request", limit);
                return Err(ThrottleError::Overflow { limit });
            }

            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            receiver
        };

        let mut request = QueuedRequest {
            bucket: &*self.bucket,
            receiver,
            settled: false,
        };
        let acquired_at = request.wait().await?;
        Ok(Lease { acquired_at })
    }

    /// Runs a unit of work once a token has been acquired
    ///
    /// Overflow and disposal errors are returned without running the work.
    pub async fn run<F, Fut, T>(&self, unit_of_work: F) -> Result<T, ThrottleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _lease = self.acquire().await?;
        Ok(unit_of_work().await)
    }

    /// Time since the last token was handed out
    ///
    /// Returns `None` while requests are waiting in the queue, since the
    /// throttle is not idle then.
    pub fn idle_duration(&self) -> Option<Duration> {
        let mut state = self.bucket.lock();
        state.prune_abandoned();
        if state.waiters.is_empty() {
            Some(state.last_acquired.elapsed())
        } else {
            None
        }
    }

    /// Number of tokens currently in the bucket
    pub fn available_tokens(&self) -> usize {
        self.bucket.lock().tokens
    }

    /// Number of requests currently waiting for a token
    pub fn queued(&self) -> usize {
        let mut state = self.bucket.lock();
        state.prune_abandoned();
        state.waiters.len()
    }

    /// Stops replenishment and fails every queued request
    ///
    /// Calling this more than once has no further effect.
    pub fn dispose(&self) {
        self.shutdown.cancel();

        let mut state = self.bucket.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.tokens = 0;
        // Dropping the senders wakes each waiter with `Disposed`
        state.waiters.clear();
    }

    /// Whether `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.bucket.lock().disposed
    }
}

impl Drop for TokenBucketThrottle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn replenish_loop(bucket: Weak<Bucket>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(bucket) = bucket.upgrade() else {
                    break;
                };
                bucket.replenish();
            }
        }
    }
}
