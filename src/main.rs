//! Wikidex main entry point
//!
//! This is the command-line interface for crawling Wikipedia into a local
//! store and querying it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use wikidex::config::{load_config_with_hash, Config};
use wikidex::output::{print_crawl_report, print_hits, print_index_stats, print_recent};
use wikidex::search::{SearchMode, SearchService};
use wikidex::storage::{open_storage, SqliteStorage};

/// Wikidex: a polite Wikipedia crawler and search index
///
/// Wikidex crawls articles through the public Wikipedia APIs with a shared
/// rate limit, stores the ones that pass its quality checks, and answers
/// lexical and TF-IDF similarity queries over the stored corpus.
#[derive(Parser, Debug)]
#[command(name = "wikidex")]
#[command(version)]
#[command(about = "A polite Wikipedia crawler and search index", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and show what would be crawled
    Check,

    /// Crawl articles into the store
    Crawl,

    /// Search the stored corpus
    Search {
        /// Free-text query
        query: String,

        /// lexical (full-text), title (title match) or vector (TF-IDF)
        #[arg(long, default_value_t = SearchMode::Vector)]
        mode: SearchMode,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show articles similar to a stored article
    Related {
        /// Article title
        title: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Complete a term from the index vocabulary
    Suggest {
        prefix: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show corpus and index statistics
    Stats,

    /// List the most recently stored articles
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Rebuild the vector index from the store
    Rebuild,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Crawl => handle_crawl(config, config_hash).await,
        Command::Search { query, mode, limit } => {
            let service = open_service(&config, mode == SearchMode::Vector).await?;
            print_hits(&service.search(&query, mode, limit).await?);
            Ok(())
        }
        Command::Related { title, limit } => {
            let service = open_service(&config, true).await?;
            print_hits(&service.related(&title, limit).await?);
            Ok(())
        }
        Command::Suggest { prefix, limit } => {
            let service = open_service(&config, true).await?;
            for term in service.suggest(&prefix, limit)? {
                println!("{}", term);
            }
            Ok(())
        }
        Command::Stats => {
            let service = open_service(&config, true).await?;
            print_index_stats(&service.stats().await?);
            Ok(())
        }
        Command::Recent { limit } => {
            let service = open_service(&config, false).await?;
            print_recent(&service.recent(limit).await?);
            Ok(())
        }
        Command::Rebuild => {
            let service = open_service(&config, false).await?;
            let outcome = service.rebuild().await?;
            println!(
                "Index generation {}: {} documents, {} terms",
                outcome.generation, outcome.documents, outcome.terms
            );
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wikidex=info,warn"),
            1 => EnvFilter::new("wikidex=debug,info"),
            2 => EnvFilter::new("wikidex=trace,debug"),
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

/// Opens the store and, when `with_index` is set, loads or builds the index
async fn open_service(
    config: &Config,
    with_index: bool,
) -> anyhow::Result<SearchService<SqliteStorage>> {
    let store = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open {}", config.output.database_path))?;
    let service = SearchService::new(Arc::new(Mutex::new(store)), config.index.clone());

    if with_index {
        service.open_index().await?;
    }
    Ok(service)
}

/// Handles `check`: shows the crawl plan for a valid configuration
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Wikidex Check ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Article quota: {}", config.crawler.article_quota);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Request interval: {}ms", config.crawler.rate_interval_ms);
    println!(
        "  Retries: {} (backoff {}ms)",
        config.crawler.max_retries, config.crawler.retry_backoff_ms
    );
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Links per article: {}", config.crawler.links_per_article);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nSource:");
    println!("  REST API: {}", config.source.rest_base_url);
    println!("  Action API: {}", config.source.action_base_url);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(index_path) = &config.index.index_path {
        println!("  Index: {}", index_path);
    }

    println!("\nSeed Titles ({}):", config.seeds.titles.len());
    for title in &config.seeds.titles {
        println!("  - {}", title);
    }

    println!("\nSeed Categories ({}):", config.seeds.categories.len());
    for category in &config.seeds.categories {
        println!("  - {}", category);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl up to {} articles from {} titles and {} categories",
        config.crawler.article_quota,
        config.seeds.titles.len(),
        config.seeds.categories.len()
    );

    Ok(())
}

/// Handles `crawl`: runs until the quota is met, the frontier drains, or
/// Ctrl-C is pressed
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    tracing::info!(
        "Seeds: {} titles, {} categories; quota {} articles with {} workers",
        config.seeds.titles.len(),
        config.seeds.categories.len(),
        config.crawler.article_quota,
        config.crawler.workers
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight articles");
            signal_token.cancel();
        }
    });

    match wikidex::run_crawl(config, config_hash, cancel).await {
        Ok(report) => {
            tracing::info!("Crawl finished");
            print_crawl_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
