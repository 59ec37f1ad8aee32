//! HTTP fetcher implementation
//!
//! This module handles the HTTP requests made by crawl bodies:
//! - Building HTTP clients with a descriptive user agent string
//! - GET requests for HTML pages
//! - Mapping non-success statuses and non-HTML content to errors

use crate::config::UserAgentConfig;
use crate::RippleError;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed for a single fetch
const MAX_REDIRECTS: usize = 10;

/// Formats the user agent string sent with every request
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use ripple_workload::config::UserAgentConfig;
/// use ripple_workload::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "RippleWorkload".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches an HTML page and returns its body
///
/// # Returns
///
/// * `Ok(String)` - The response body of a 2xx `text/html` response
/// * `Err(RippleError::HttpStatus)` - Any non-success status
/// * `Err(RippleError::ContentMismatch)` - The response was not HTML
/// * `Err(RippleError::Http)` - Connection, timeout or body errors
pub async fn fetch_html(client: &Client, url: &Url) -> Result<String, RippleError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();

    if !status.is_success() {
        return Err(RippleError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.contains("text/html") {
        return Err(RippleError::ContentMismatch {
            url: url.to_string(),
            content_type,
        });
    }

    Ok(response.text().await?)
}
