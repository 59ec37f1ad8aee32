//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive the full
//! run-and-dispatch cycle end-to-end through the public API.

use ripple_workload::crawler::{
    CrawlOrchestrator, CrawlerFactory, Driver, LinkCrawlerFactory, PageKind,
};
use ripple_workload::state::{CrawlResult, VisitRegistry, VisitState};
use ripple_workload::throttle::{PartitionedThrottle, ThrottleOptions};
use ripple_workload::{DispatchError, RippleError};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Everything a crawl needs, shared the way the binary shares it
struct Harness {
    registry: Arc<VisitRegistry>,
    throttle: Arc<PartitionedThrottle>,
    factory: Arc<LinkCrawlerFactory>,
}

impl Harness {
    fn new(max_concurrent: usize, interval: Duration) -> Self {
        let registry = Arc::new(VisitRegistry::new());
        let options = ThrottleOptions::new(max_concurrent, 100, interval)
            .expect("Failed to build throttle options");
        let throttle = Arc::new(PartitionedThrottle::new(options, None));
        let factory = Arc::new(LinkCrawlerFactory::new(
            registry.clone(),
            throttle.clone(),
            reqwest::Client::new(),
            false,
        ));

        Self {
            registry,
            throttle,
            factory,
        }
    }

    fn visit_state(&self, url: &Url) -> Option<VisitState> {
        self.registry.visit(url.as_str()).map(|v| v.last_result)
    }
}

/// Mounts an HTML page at `route`
async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

fn page_url(server: &MockServer, route: &str) -> Url {
    Url::parse(&server.uri())
        .expect("Failed to parse base URL")
        .join(route)
        .expect("Failed to join route")
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    // Start a mock server for the site and one for an external host
    let site = MockServer::start().await;
    let external = MockServer::start().await;
    let base_url = site.uri();

    // Mock index page linking to both pages, a broken page and an external page
    mount_page(
        &site,
        "/",
        format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="/broken">Broken</a>
            <a href="{}/ext">External</a>
            </body></html>"#,
            base_url,
            external.uri()
        ),
    )
    .await;

    // Both pages link back home and to the broken page
    for route in ["/page1", "/page2"] {
        mount_page(
            &site,
            route,
            r#"<html><body><a href="/">Home</a><a href="/broken">Broken</a></body></html>"#
                .to_string(),
        )
        .await;
    }

    // Broken page fails on every attempt
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&site)
        .await;

    // The external page is fetched as a leaf, so its links are never followed
    mount_page(
        &external,
        "/ext",
        r#"<html><body><a href="/ext-child">Child</a></body></html>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/ext-child"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&external)
        .await;

    // One run at a time, so every dispatch of the broken page sees the last
    // attempt's failure rather than a pending run
    let harness = Harness::new(10, Duration::from_millis(10));
    let driver = Driver::new(harness.factory.clone(), 2, 1);

    let stats = driver
        .run(vec![(PageKind::Site, page_url(&site, "/"))])
        .await
        .expect("Crawl failed");

    for route in ["/", "/page1", "/page2"] {
        assert_eq!(
            harness.visit_state(&page_url(&site, route)),
            Some(VisitState::Success),
            "Expected {} to be crawled",
            route
        );
    }
    assert_eq!(
        harness.visit_state(&page_url(&external, "/ext")),
        Some(VisitState::Success)
    );
    assert_eq!(harness.visit_state(&page_url(&external, "/ext-child")), None);

    // Dispatched by /, /page1 and /page2: attempted once per dispatch, up to the limit
    let broken = harness
        .registry
        .visit(page_url(&site, "/broken").as_str())
        .expect("Broken page has no registry entry");
    assert_eq!(broken.visit_count, 3);
    assert_eq!(broken.last_result, VisitState::Failure);

    assert_eq!(stats.count(CrawlResult::Success), 4);
    assert_eq!(stats.count(CrawlResult::Failure), 3);
    assert!(stats.count(CrawlResult::Duplicate) >= 2);

    // One throttle partition per host
    assert_eq!(harness.throttle.partition_count(), 2);
    harness.throttle.shutdown().await;
}

#[tokio::test]
async fn test_crawl_with_depth_limit() {
    let site = MockServer::start().await;

    // Create a chain: / -> level1 -> level2 -> level3
    mount_page(&site, "/", r#"<a href="/level1">Level 1</a>"#.to_string()).await;
    mount_page(&site, "/level1", r#"<a href="/level2">Level 2</a>"#.to_string()).await;
    mount_page(&site, "/level2", r#"<a href="/level3">Level 3</a>"#.to_string()).await;

    // Level3 should not be crawled (depth > 2)
    // Wiremock will automatically verify expect(0) when the mock server drops
    Mock::given(method("GET"))
        .and(path("/level3"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .expect(0)
        .mount(&site)
        .await;

    let harness = Harness::new(10, Duration::from_millis(10));
    let driver = Driver::new(harness.factory.clone(), 2, 4);

    let stats = driver
        .run(vec![(PageKind::Site, page_url(&site, "/"))])
        .await
        .expect("Crawl failed");

    assert_eq!(stats.count(CrawlResult::Success), 3);
    assert_eq!(stats.depth_limited, 1);
    assert_eq!(harness.visit_state(&page_url(&site, "/level3")), None);

    harness.throttle.shutdown().await;
}

#[tokio::test]
async fn test_non_html_page_is_a_failure() {
    let site = MockServer::start().await;

    mount_page(&site, "/", r#"<a href="/report.pdf">Report</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .mount(&site)
        .await;

    let harness = Harness::new(10, Duration::from_millis(10));
    let driver = Driver::new(harness.factory.clone(), 2, 4);

    let stats = driver
        .run(vec![(PageKind::Site, page_url(&site, "/"))])
        .await
        .expect("Crawl failed");

    assert_eq!(stats.count(CrawlResult::Success), 1);
    assert_eq!(stats.count(CrawlResult::Failure), 1);
    assert_eq!(
        harness.visit_state(&page_url(&site, "/report.pdf")),
        Some(VisitState::Failure)
    );

    harness.throttle.shutdown().await;
}

#[tokio::test]
async fn test_requests_to_one_host_are_rate_limited() {
    let site = MockServer::start().await;

    mount_page(
        &site,
        "/",
        r#"<a href="/a">A</a><a href="/b">B</a>"#.to_string(),
    )
    .await;
    mount_page(&site, "/a", "<html></html>".to_string()).await;
    mount_page(&site, "/b", "<html></html>".to_string()).await;

    // One token per 200ms: the third fetch cannot start before 400ms
    let harness = Harness::new(1, Duration::from_millis(200));
    let driver = Driver::new(harness.factory.clone(), 2, 4);

    let stats = driver
        .run(vec![(PageKind::Site, page_url(&site, "/"))])
        .await
        .expect("Crawl failed");

    assert_eq!(stats.count(CrawlResult::Success), 3);
    assert!(
        stats.elapsed >= Duration::from_millis(300),
        "Crawl finished too quickly: {:?}",
        stats.elapsed
    );

    harness.throttle.shutdown().await;
}

/// Dispatches the same resource with two different crawler kinds
struct AmbiguousFactory {
    registry: Arc<VisitRegistry>,
}

impl CrawlerFactory<PageKind> for AmbiguousFactory {
    fn create(&self, _kind: PageKind, entrypoint: Url) -> CrawlOrchestrator<PageKind> {
        CrawlOrchestrator::from_fn(self.registry.clone(), entrypoint, |url, dispatch| async move {
            let next = url.join("/next")?;
            dispatch.dispatch(next.clone(), PageKind::Site)?;
            dispatch.dispatch(next, PageKind::Leaf)?;
            anyhow::Ok(())
        })
    }
}

#[tokio::test]
async fn test_ambiguous_dispatch_fails_the_crawl() {
    let registry = Arc::new(VisitRegistry::new());
    let driver = Driver::new(
        Arc::new(AmbiguousFactory {
            registry: registry.clone(),
        }),
        5,
        4,
    );

    let seed = Url::parse("https://example.com/").expect("Failed to parse seed");
    let err = driver
        .run(vec![(PageKind::Site, seed.clone())])
        .await
        .expect_err("Crawl should fail");

    match err {
        RippleError::Dispatch(DispatchError::Ambiguous {
            url,
            existing,
            requested,
        }) => {
            assert_eq!(url, "https://example.com/next");
            assert_eq!(existing, "site");
            assert_eq!(requested, "leaf");
        }
        other => panic!("Unexpected error: {}", other),
    }

    assert_eq!(
        registry.visit(seed.as_str()).map(|v| v.last_result),
        Some(VisitState::Failure)
    );
    assert!(registry.visit("https://example.com/next").is_none());
}
