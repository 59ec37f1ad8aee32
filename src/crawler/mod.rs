//! Crawler module for running and chaining crawls
//!
//! This module contains the crawling logic, including:
//! - Admission, execution and dispatch recording for a single resource
//! - The factory seam that turns dispatch entries into new runs
//! - HTTP fetching and HTML parsing for the built-in page crawlers
//! - The driver loop that feeds dispatched work back in

mod driver;
mod factory;
mod fetcher;
mod links;
mod orchestrator;
mod page;
mod parser;

pub use driver::Driver;
pub use factory::CrawlerFactory;
pub use fetcher::{build_http_client, fetch_html, user_agent_string};
pub use links::{LinkCrawlerFactory, PageKind};
pub use orchestrator::{CrawlBody, CrawlOrchestrator, CrawlOutcome, CrawlerKind, Dispatch};
pub use page::{Extract, HtmlPage, Page};
pub use parser::{parse_html, ParsedPage};
