//! Ripple-Workload main entry point
//!
//! This is the command-line interface for the Ripple-Workload crawler.

use anyhow::Context;
use clap::Parser;
use ripple_workload::config::{load_config_with_hash, Config};
use ripple_workload::crawler::{build_http_client, Driver, LinkCrawlerFactory, PageKind};
use ripple_workload::output::print_statistics;
use ripple_workload::state::VisitRegistry;
use ripple_workload::throttle::PartitionedThrottle;
use ripple_workload::url::normalize_url;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Ripple-Workload: a throttled recursive site crawler
///
/// Ripple-Workload crawls outward from a set of seed URLs, running each page
/// at most once (with bounded retries on failure) and never exceeding a
/// per-host request rate.
#[derive(Parser, Debug)]
#[command(name = "ripple-workload")]
#[command(version = "1.0.0")]
#[command(about = "A throttled recursive site crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_crawl(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_workload=info,warn"),
            1 => EnvFilter::new("ripple_workload=debug,info"),
            2 => EnvFilter::new("ripple_workload=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Parses and canonicalizes the configured seeds
fn seeds(config: &Config) -> anyhow::Result<Vec<(PageKind, Url)>> {
    config
        .seeds
        .iter()
        .map(|seed| -> anyhow::Result<(PageKind, Url)> {
            let url = normalize_url(&seed.url)
                .with_context(|| format!("Invalid seed URL {}", seed.url))?;
            Ok((seed.kind, url))
        })
        .collect()
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Ripple-Workload Dry Run ===\n");

    println!("Throttle (per host):");
    println!("  Max concurrent: {}", config.throttle.max_concurrent);
    println!("  Max queued: {}", config.throttle.max_queued);
    println!("  Interval: {}ms", config.throttle.interval_ms);
    match config.throttle.idle_timeout() {
        Some(timeout) => println!(
            "  Idle hosts dropped after: {}s (checked every {}s)",
            timeout.as_secs(),
            config.throttle.sweep_period_secs
        ),
        None => println!("  Idle hosts dropped after: never"),
    }

    println!("\nCrawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max concurrent runs: {}", config.crawler.max_concurrent_runs);
    println!("  Attempts per page: {}", config.registry.max_retries);
    println!("  Follow external links: {}", config.crawler.follow_external);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    let seeds = seeds(config)?;
    println!("\nSeeds ({}):", seeds.len());
    for (kind, url) in &seeds {
        println!("  - {} ({})", url, kind);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", seeds.len());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let seeds = seeds(&config)?;
    if seeds.is_empty() {
        tracing::warn!("No seeds configured, nothing to crawl");
        return Ok(());
    }

    let registry = Arc::new(VisitRegistry::with_max_retries(config.registry.max_retries));
    let throttle = Arc::new(PartitionedThrottle::with_sweep_period(
        config.throttle.options()?,
        config.throttle.idle_timeout(),
        config.throttle.sweep_period(),
    ));
    let client = build_http_client(&config.user_agent)?;

    let factory = Arc::new(LinkCrawlerFactory::new(
        registry.clone(),
        throttle.clone(),
        client,
        config.crawler.follow_external,
    ));
    let driver = Driver::new(
        factory,
        config.crawler.max_depth,
        config.crawler.max_concurrent_runs,
    );

    let result = driver.run(seeds).await;
    throttle.shutdown().await;

    match result {
        Ok(stats) => {
            tracing::info!("Crawl completed successfully");
            print_statistics(&stats, Some(registry.counts()));
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
