use crate::crawler::{CrawlOrchestrator, CrawlerKind};
use url::Url;

/// Turns a dispatch entry into a runnable crawl
///
/// Implementations own whatever the crawl bodies need (HTTP client, throttle,
/// the shared visit registry) and hand each new orchestrator its share.
pub trait CrawlerFactory<K: CrawlerKind>: Send + Sync {
    /// Creates an orchestrator of crawler type `kind` for `entrypoint`
    fn create(&self, kind: K, entrypoint: Url) -> CrawlOrchestrator<K>;
}
