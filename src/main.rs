//! Corpus-Crawler main entry point
//!
//! This is the command-line interface for the Corpus-Crawler web crawler.

use anyhow::Context;
use clap::Parser;
use corpus_crawler::config::{compute_config_hash, read_config, validate, Config};
use corpus_crawler::crawler::run_crawl;
use corpus_crawler::output::{load_statistics, print_manifest_statistics, print_statistics};
use corpus_crawler::storage::open_manifest;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Corpus-Crawler: a scoped, polite breadth-first web crawler
///
/// Corpus-Crawler starts from seed URLs, stays within the configured scope,
/// paces requests per domain, and saves pages as markdown alongside the PDFs
/// and images it finds.
#[derive(Parser, Debug)]
#[command(name = "corpus-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A scoped, polite breadth-first web crawler", long_about = None)]
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

    /// Seed URL replacing the configured seeds (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the provenance manifest and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = read_config(&cli.config)
        .with_context(|| format!("failed to read {}", cli.config.display()))?;
    if !cli.seeds.is_empty() {
        tracing::info!("Using {} seed(s) from the command line", cli.seeds.len());
        config.crawl.seeds = cli.seeds.clone();
    }
    validate(&config).context("invalid configuration")?;

    let config_hash = compute_config_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("corpus_crawler=info,warn"),
            1 => EnvFilter::new("corpus_crawler=debug,info"),
            2 => EnvFilter::new("corpus_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows the validated crawl plan
fn handle_dry_run(config: &Config) {
    let crawl = &config.crawl;
    let scope = &config.scope;

    println!("=== Corpus-Crawler Dry Run ===\n");

    println!("Seeds ({}):", crawl.seeds.len());
    for seed in &crawl.seeds {
        println!("  - {}", seed);
    }

    println!("\nLimits:");
    println!(
        "  Max depth: {}{}",
        crawl.max_depth,
        if crawl.strict_depth { " (strict)" } else { "" }
    );
    println!("  Max pages: {}", crawl.max_pages);
    println!("  Max pages per domain: {}", crawl.max_pages_per_domain);
    if let Some(limit) = crawl.max_run_time_sec {
        println!("  Max run time: {}s", limit);
    }

    println!("\nPoliteness:");
    println!("  User agent: {}", crawl.user_agent);
    println!("  Per-domain delay: {}s", crawl.delay_between_requests_sec);
    println!("  Pause between tasks: {}s", crawl.inter_request_delay_sec);
    println!(
        "  Retries: {} (backoff factor {}s)",
        crawl.max_retries, crawl.backoff_factor_sec
    );
    println!("  Respect robots.txt: {}", crawl.respect_robots_txt);

    println!("\nScope:");
    println!("  Internal only: {}", scope.internal_only);
    println!("  Allow subdomains: {}", scope.allow_subdomains);
    for domain in &scope.external_sites_whitelist {
        println!("  Whitelisted: {}", domain);
    }
    for pattern in &scope.url_patterns_exclude {
        println!("  Exclude: {}", pattern);
    }
    for pattern in &scope.url_patterns_include {
        println!("  Include: {}", pattern);
    }

    println!("\nStorage:");
    println!("  Root: {}", config.storage.root.display());
    if config.storage.manifest {
        println!("  Manifest: {}", config.storage.manifest_path().display());
    }
    println!("  Image extensions: {}", config.storage.image_extensions.join(", "));

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the manifest
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = config.storage.manifest_path();
    if !path.exists() {
        anyhow::bail!("no manifest found at {}", path.display());
    }

    println!("Manifest: {}\n", path.display());
    let manifest = open_manifest(&path)
        .with_context(|| format!("failed to open manifest {}", path.display()))?;
    let stats = load_statistics(&manifest)?;
    print_manifest_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} seed(s) into {}",
        config.crawl.seeds.len(),
        config.storage.root.display()
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::warn!("Interrupt received, finishing up"),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    let stats = run_crawl(config, config_hash, shutdown)
        .await
        .context("crawl setup failed")?;

    print_statistics(&stats);
    Ok(())
}
