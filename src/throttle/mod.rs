//! Throttle module for rate-limited work
//!
//! This module provides the admission control every crawl body runs its
//! rate-limited sub-operations under.
//!
//! # Components
//!
//! - `ThrottleOptions`: Immutable limits shared by every partition
//! - `TokenBucketThrottle`: A single replenishing token bucket with a bounded FIFO wait queue
//! - `PartitionedThrottle`: One token bucket per partition key, with idle-partition eviction

mod options;
mod partitioned;
mod token_bucket;

pub use options::ThrottleOptions;
pub use partitioned::{PartitionedThrottle, DEFAULT_SWEEP_PERIOD};
pub use token_bucket::{Lease, TokenBucketThrottle};
