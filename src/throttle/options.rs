use crate::ConfigError;
use std::time::Duration;

/// Operating parameters of a token-bucket throttle
///
/// The bucket holds `max_concurrent` tokens and is topped back up to that
/// amount every `interval`. Requests that find the bucket empty wait in a
/// FIFO queue of at most `max_queued` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleOptions {
    max_concurrent: usize,
    max_queued: usize,
    interval: Duration,
}

impl ThrottleOptions {
    /// Creates a validated set of throttle options
    ///
    /// # Returns
    ///
    /// * `Ok(ThrottleOptions)` - `max_concurrent` and `interval` are both non-zero
    /// * `Err(ConfigError::Validation)` - Either limit is zero
    pub fn new(
        max_concurrent: usize,
        max_queued: usize,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        if max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }

        if interval.is_zero() {
            return Err(ConfigError::Validation(
                "interval must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            max_concurrent,
            max_queued,
            interval,
        })
    }

    /// Bucket capacity, and the number of tokens added each interval
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Maximum number of requests allowed to wait for a token
    pub fn max_queued(&self) -> usize {
        self.max_queued
    }

    /// Replenishment period
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
