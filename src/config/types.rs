use crate::crawler::PageKind;
use crate::state::DEFAULT_MAX_RETRIES;
use crate::throttle::{ThrottleOptions, DEFAULT_SWEEP_PERIOD};
use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Ripple-Workload
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub seeds: Vec<SeedEntry>,
}

/// Per-host token bucket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Tokens each host's bucket holds when full
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Requests allowed to wait for a token per host
    #[serde(rename = "max-queued")]
    pub max_queued: usize,

    /// Time between bucket refills (milliseconds)
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Hosts idle for longer than this are dropped; never when absent
    #[serde(rename = "partition-idle-timeout-secs", default)]
    pub partition_idle_timeout_secs: Option<u64>,

    /// How often idle hosts are looked for
    #[serde(rename = "sweep-period-secs", default = "default_sweep_period_secs")]
    pub sweep_period_secs: u64,
}

impl ThrottleConfig {
    /// Builds the options shared by every host's bucket
    pub fn options(&self) -> Result<ThrottleOptions, ConfigError> {
        ThrottleOptions::new(
            self.max_concurrent,
            self.max_queued,
            Duration::from_millis(self.interval_ms),
        )
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.partition_idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_period_secs)
    }
}

fn default_sweep_period_secs() -> u64 {
    DEFAULT_SWEEP_PERIOD.as_secs()
}

/// Visit registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Total attempts allowed per resource, including the first
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum dispatch hops to follow from seed URLs
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Maximum number of crawl runs in flight at once
    #[serde(rename = "max-concurrent-runs")]
    pub max_concurrent_runs: usize,

    /// Crawl links to other hosts as sites instead of leaves
    #[serde(rename = "follow-external", default)]
    pub follow_external: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// A URL the crawl starts from
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub url: String,

    /// Crawler used for the seed itself
    #[serde(default)]
    pub kind: PageKind,
}
