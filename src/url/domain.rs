use crate::UrlError;
use url::Url;

/// Derives the throttle partition key for a URL
///
/// The key is the lowercase host, followed by `:port` when the URL names a
/// non-default port, so two services on one machine are throttled separately.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ripple_workload::url::partition_key;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(partition_key(&url).unwrap(), "example.com");
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(partition_key(&url).unwrap(), "127.0.0.1:8080");
/// ```
pub fn partition_key(url: &Url) -> Result<String, UrlError> {
    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}
