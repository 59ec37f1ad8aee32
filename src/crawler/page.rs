//! Page abstraction used by crawl bodies
//!
//! A page is initialized once (fetched under the host's throttle) and then
//! queried for typed extracts.

use crate::crawler::fetcher::fetch_html;
use crate::crawler::parser::{parse_html, ParsedPage};
use crate::throttle::PartitionedThrottle;
use crate::url::partition_key;
use crate::RippleError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use url::Url;

/// A crawlable document that must be initialized before it is read
#[async_trait]
pub trait Page: Send + Sync {
    /// The location this page was created for
    fn url(&self) -> &Url;

    /// Loads the page, acquiring a token from the page host's partition first
    async fn init(&mut self, throttle: Arc<PartitionedThrottle>) -> crate::Result<()>;
}

/// Typed data that can be read from an initialized page
#[async_trait]
pub trait Extract<T>: Page {
    async fn extract(&self) -> crate::Result<T>;
}

/// An HTML document fetched over HTTP
pub struct HtmlPage {
    url: Url,
    client: Client,
    document: Option<ParsedPage>,
}

impl HtmlPage {
    pub fn new(url: Url, client: Client) -> Self {
        Self {
            url,
            client,
            document: None,
        }
    }

    /// Returns true once `init` has completed successfully
    pub fn is_initialized(&self) -> bool {
        self.document.is_some()
    }

    fn document(&self) -> crate::Result<&ParsedPage> {
        self.document
            .as_ref()
            .ok_or_else(|| RippleError::PageNotInitialized {
                url: self.url.to_string(),
            })
    }
}

#[async_trait]
impl Page for HtmlPage {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn init(&mut self, throttle: Arc<PartitionedThrottle>) -> crate::Result<()> {
        let key = partition_key(&self.url)?;
        let client = &self.client;
        let url = &self.url;

        let html = throttle.run(&key, || fetch_html(client, url)).await??;

        self.document = Some(parse_html(&html, &self.url));
        Ok(())
    }
}

#[async_trait]
impl Extract<Vec<Url>> for HtmlPage {
    async fn extract(&self) -> crate::Result<Vec<Url>> {
        Ok(self.document()?.links.clone())
    }
}

#[async_trait]
impl Extract<Option<String>> for HtmlPage {
    async fn extract(&self) -> crate::Result<Option<String>> {
        Ok(self.document()?.title.clone())
    }
}
