//! Ripple-Workload: the admission and throttling core of a recursive site crawler
//!
//! This crate decides, for any addressable resource, whether a crawl of it
//! should start, runs admitted crawls under per-partition token-bucket
//! throttles, and hands follow-up work back to a caller-controlled driver.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod throttle;
pub mod url;

use thiserror::Error;

/// Main error type for Ripple-Workload operations
#[derive(Debug, Error)]
pub enum RippleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Throttle error: {0}")]
    Throttle(#[from] ThrottleError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Expected HTML from {url}, got {content_type}")]
    ContentMismatch { url: String, content_type: String },

    #[error("Page {url} was extracted before being initialized")]
    PageNotInitialized { url: String },

    #[error("Crawl task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a token-bucket throttle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleError {
    #[error("Throttle request queue exceeded limit of [{limit}] requests")]
    Overflow { limit: usize },

    #[error("Throttle has been disposed")]
    Disposed,
}

/// Errors raised while recording follow-up work for a crawl run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(
        "Cannot dispatch crawler on [{url}] of type [{requested}]. Crawler [{existing}] is already requested for that location"
    )]
    Ambiguous {
        url: String,
        existing: String,
        requested: String,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Ripple-Workload operations
pub type Result<T> = std::result::Result<T, RippleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, CrawlOutcome, CrawlerFactory, Dispatch};
pub use state::{CrawlResult, Visit, VisitRegistry, VisitState};
pub use throttle::{PartitionedThrottle, ThrottleOptions, TokenBucketThrottle};
pub use url::{normalize_url, partition_key};
