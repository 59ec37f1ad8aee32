//! Link-following crawlers
//!
//! `Site` pages are fetched and their links dispatched; `Leaf` pages are
//! fetched to confirm they resolve but never followed.

use crate::crawler::page::{Extract, HtmlPage, Page};
use crate::crawler::{CrawlOrchestrator, CrawlerFactory, Dispatch};
use crate::state::VisitRegistry;
use crate::throttle::PartitionedThrottle;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// The crawler that should handle a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// A page on the crawled site; its links are followed
    #[default]
    Site,

    /// A page that is fetched but whose links are ignored
    Leaf,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageKind::Site => f.write_str("site"),
            PageKind::Leaf => f.write_str("leaf"),
        }
    }
}

impl FromStr for PageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "site" => Ok(PageKind::Site),
            "leaf" => Ok(PageKind::Leaf),
            other => Err(format!("Unknown page kind: {}", other)),
        }
    }
}

/// Builds orchestrators that fetch pages and dispatch the links they contain
#[derive(Clone)]
pub struct LinkCrawlerFactory {
    registry: Arc<VisitRegistry>,
    throttle: Arc<PartitionedThrottle>,
    client: Client,
    follow_external: bool,
}

impl LinkCrawlerFactory {
    /// Creates a factory sharing one registry, throttle and HTTP client
    ///
    /// Links leaving the page's host are dispatched as `Leaf` unless
    /// `follow_external` is set.
    pub fn new(
        registry: Arc<VisitRegistry>,
        throttle: Arc<PartitionedThrottle>,
        client: Client,
        follow_external: bool,
    ) -> Self {
        Self {
            registry,
            throttle,
            client,
            follow_external,
        }
    }

    pub fn registry(&self) -> &Arc<VisitRegistry> {
        &self.registry
    }
}

impl CrawlerFactory<PageKind> for LinkCrawlerFactory {
    fn create(&self, kind: PageKind, entrypoint: Url) -> CrawlOrchestrator<PageKind> {
        let throttle = self.throttle.clone();
        let client = self.client.clone();
        let follow_external = self.follow_external;

        CrawlOrchestrator::from_fn(self.registry.clone(), entrypoint, move |url, dispatch| {
            crawl_page(
                kind,
                url,
                dispatch,
                throttle.clone(),
                client.clone(),
                follow_external,
            )
        })
    }
}

async fn crawl_page(
    kind: PageKind,
    url: Url,
    dispatch: Dispatch<PageKind>,
    throttle: Arc<PartitionedThrottle>,
    client: Client,
    follow_external: bool,
) -> anyhow::Result<()> {
    let mut page = HtmlPage::new(url.clone(), client);
    page.init(throttle).await?;

    if kind == PageKind::Leaf {
        return Ok(());
    }

    let title: Option<String> = page.extract().await?;
    tracing::info!("Crawled {} ({})", url, title.as_deref().unwrap_or("untitled"));

    let links: Vec<Url> = page.extract().await?;
    for link in links {
        if link == url {
            continue;
        }
        let next = if follow_external || same_host(&url, &link) {
            PageKind::Site
        } else {
            PageKind::Leaf
        };
        dispatch.dispatch(link, next)?;
    }

    Ok(())
}

fn same_host(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}
