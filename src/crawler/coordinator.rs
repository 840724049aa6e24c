//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the worker pool that drives a crawl, including:
//! - Seeding the frontier from titles and category listings
//! - Skipping articles the store already holds
//! - Fetching, normalizing and following links from accepted articles
//! - Batching accepted documents into store transactions
//! - Stopping on quota, exhaustion or cancellation
//! - Recording the run and reporting totals

use crate::config::{validate_crawler_config, Config, CrawlerConfig, QualityConfig, SeedConfig};
use crate::crawler::fetcher::{FetchErrorKind, Fetcher};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::gate::RateGate;
use crate::crawler::normalizer::{outbound_links, Normalizer};
use crate::crawler::source::{
    ArticleSource, WikipediaClient, ARTICLE_NAMESPACE, CATEGORY_NAMESPACE,
};
use crate::storage::{open_storage, Document, DocumentStore, RunStatus};
use crate::{ConfigError, WikidexError};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Accepted-document interval between progress log lines
const PROGRESS_INTERVAL: u64 = 50;

/// Store attempts per batch before it is given up
const FLUSH_ATTEMPTS: usize = 2;

/// Totals for one crawl
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// Run record id, when the run was recorded
    pub run_id: Option<i64>,
    /// Articles retrieved from the source
    pub fetched: u64,
    /// Articles that passed normalization
    pub accepted: u64,
    /// Articles rejected by the quality checks
    pub rejected: u64,
    /// Identifiers that can never produce an article
    pub skipped: u64,
    /// Identifiers whose retries ran out
    pub unavailable: u64,
    /// Accepted articles the store or frontier already knew
    pub duplicates: u64,
    /// Documents newly written to the store
    pub persisted: u64,
    /// Batches dropped after a failed retry
    pub failed_batches: u64,
    /// Documents lost with those batches
    pub lost_documents: u64,
    /// Links admitted to the frontier
    pub discovered: u64,
    /// Entries left in the frontier at shutdown
    pub pending: usize,
    pub elapsed: Duration,
    /// Whether the crawl stopped because it was cancelled
    pub cancelled: bool,
}

impl CrawlReport {
    /// Accepted articles per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.accepted as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct CrawlCounters {
    fetched: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    skipped: AtomicU64,
    unavailable: AtomicU64,
    duplicates: AtomicU64,
    persisted: AtomicU64,
    failed_batches: AtomicU64,
    lost_documents: AtomicU64,
    discovered: AtomicU64,
}

impl CrawlCounters {
    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::SeqCst);
    }

    fn report(&self) -> CrawlReport {
        CrawlReport {
            fetched: self.fetched.load(Ordering::SeqCst),
            accepted: self.accepted.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            unavailable: self.unavailable.load(Ordering::SeqCst),
            duplicates: self.duplicates.load(Ordering::SeqCst),
            persisted: self.persisted.load(Ordering::SeqCst),
            failed_batches: self.failed_batches.load(Ordering::SeqCst),
            lost_documents: self.lost_documents.load(Ordering::SeqCst),
            discovered: self.discovered.load(Ordering::SeqCst),
            ..Default::default()
        }
    }
}

/// Main crawler structure
///
/// Owns the shared frontier and fetcher and runs a fixed pool of workers
/// against them. Every worker keeps its own batch of accepted documents and
/// flushes it to the shared store.
pub struct Crawler<S: DocumentStore + 'static> {
    config: Arc<CrawlerConfig>,
    seeds: SeedConfig,
    store: Arc<Mutex<S>>,
    fetcher: Arc<Fetcher>,
    normalizer: Arc<Normalizer>,
    frontier: Arc<Frontier>,
    counters: Arc<CrawlCounters>,
    cancel: CancellationToken,
    config_hash: String,
}

impl<S: DocumentStore + 'static> Crawler<S> {
    /// Creates a new crawler
    ///
    /// # Arguments
    ///
    /// * `config` - Pool size, quota, pacing and batching
    /// * `seeds` - Titles and categories to start from
    /// * `quality` - Thresholds for accepting articles
    /// * `store` - Destination for accepted documents
    /// * `source` - Where articles are fetched from
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to seed and run
    /// * `Err(WikidexError)` - The configuration is unusable
    pub fn new(
        config: CrawlerConfig,
        seeds: SeedConfig,
        quality: QualityConfig,
        store: Arc<Mutex<S>>,
        source: Arc<dyn ArticleSource>,
    ) -> Result<Self, WikidexError> {
        validate_crawler_config(&config)?;

        let normalizer = Normalizer::new(quality)
            .map_err(|e| ConfigError::Validation(format!("invalid skip pattern: {}", e)))?;
        let fetcher = Fetcher::from_config(source, &config);
        let frontier = Frontier::new(config.max_queue);

        Ok(Self {
            config: Arc::new(config),
            seeds,
            store,
            fetcher: Arc::new(fetcher),
            normalizer: Arc::new(normalizer),
            frontier: Arc::new(frontier),
            counters: Arc::new(CrawlCounters::default()),
            cancel: CancellationToken::new(),
            config_hash: String::new(),
        })
    }

    /// Sets the configuration hash recorded with the run
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Uses an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the crawl when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    /// Fills the frontier from the configured seeds
    ///
    /// Titles already in the store are marked visited first, so a repeated
    /// crawl only fetches articles it does not have yet.
    ///
    /// # Returns
    ///
    /// The number of titles queued
    pub async fn seed(&self) -> Result<usize, WikidexError> {
        let existing = self.store.lock().await.existing_ids()?;
        let known = self.frontier.mark_all_visited(existing).await;
        if known > 0 {
            tracing::info!("{} articles already stored, they will not be fetched again", known);
        }

        let mut queued = 0;
        for title in &self.seeds.titles {
            let title = title.trim();
            if title.is_empty() {
                continue;
            }
            if self.frontier.enqueue(FrontierEntry::seed(title)).await {
                queued += 1;
            }
        }

        for category in &self.seeds.categories {
            if self.cancel.is_cancelled() {
                break;
            }
            queued += self.expand_category(category).await;
        }

        tracing::info!("Seeded frontier with {} titles", queued);
        Ok(queued)
    }

    /// Queues the articles of a category and of its direct subcategories
    async fn expand_category(&self, category: &str) -> usize {
        let members = match self
            .fetcher
            .category_members(category, self.seeds.category_limit)
            .await
        {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!("Could not list {}: {}", category, e);
                return 0;
            }
        };

        let mut queued = 0;
        for member in members {
            match member.ns {
                ARTICLE_NAMESPACE => {
                    let entry = FrontierEntry {
                        title: member.title,
                        depth: 0,
                        origin: Some(category.to_string()),
                    };
                    if self.frontier.enqueue(entry).await {
                        queued += 1;
                    }
                }
                CATEGORY_NAMESPACE => {
                    queued += self.expand_subcategory(&member.title).await;
                }
                _ => {}
            }
        }

        tracing::debug!("Category {} contributed {} titles", category, queued);
        queued
    }

    async fn expand_subcategory(&self, subcategory: &str) -> usize {
        let members = match self
            .fetcher
            .category_members(subcategory, self.seeds.subcategory_limit)
            .await
        {
            Ok(members) => members,
            Err(e) => {
                tracing::debug!("Could not list {}: {}", subcategory, e);
                return 0;
            }
        };

        let mut queued = 0;
        for member in members.into_iter().filter(|m| m.ns == ARTICLE_NAMESPACE) {
            let entry = FrontierEntry {
                title: member.title,
                depth: 0,
                origin: Some(subcategory.to_string()),
            };
            if self.frontier.enqueue(entry).await {
                queued += 1;
            }
        }
        queued
    }

    /// Runs the worker pool until the frontier is exhausted, the quota is
    /// reached, or the crawl is cancelled
    ///
    /// Every accepted document is flushed before this returns. The run is
    /// recorded as completed, or as interrupted after cancellation.
    pub async fn run(&self) -> Result<CrawlReport, WikidexError> {
        let started = Instant::now();
        let run_id = self.store.lock().await.create_run(&self.config_hash)?;

        tracing::info!(
            "Starting crawl run {} with {} workers, quota {}",
            run_id,
            self.config.workers,
            self.config.article_quota
        );

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            workers.spawn(self.worker(id).run());
        }

        let mut join_error = None;
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("Crawl worker failed: {}", e);
                // a lost worker never completes its item, so release the others
                self.frontier.close().await;
                join_error.get_or_insert(e);
            }
        }

        let cancelled = self.cancel.is_cancelled();
        let mut report = self.counters.report();
        report.run_id = Some(run_id);
        report.pending = self.frontier.len().await;
        report.elapsed = started.elapsed();
        report.cancelled = cancelled;

        let status = if cancelled || join_error.is_some() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        self.store
            .lock()
            .await
            .finish_run(run_id, status, report.accepted, report.persisted)?;

        if let Some(e) = join_error {
            return Err(e.into());
        }

        tracing::info!(
            "Crawl run {} {}: {} accepted, {} persisted in {:?}",
            run_id,
            if cancelled { "interrupted" } else { "completed" },
            report.accepted,
            report.persisted,
            report.elapsed
        );

        Ok(report)
    }

    fn worker(&self, id: usize) -> Worker<S> {
        Worker {
            id,
            config: self.config.clone(),
            store: self.store.clone(),
            fetcher: self.fetcher.clone(),
            normalizer: self.normalizer.clone(),
            frontier: self.frontier.clone(),
            counters: self.counters.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// One crawl task with its own document batch
struct Worker<S: DocumentStore + 'static> {
    id: usize,
    config: Arc<CrawlerConfig>,
    store: Arc<Mutex<S>>,
    fetcher: Arc<Fetcher>,
    normalizer: Arc<Normalizer>,
    frontier: Arc<Frontier>,
    counters: Arc<CrawlCounters>,
    cancel: CancellationToken,
}

impl<S: DocumentStore + 'static> Worker<S> {
    async fn run(self) {
        let mut batch = Vec::with_capacity(self.config.batch_size);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let next = tokio::select! {
                entry = self.frontier.dequeue() => entry,
                _ = self.cancel.cancelled() => None,
            };
            let Some(entry) = next else {
                break;
            };

            self.process(&entry, &mut batch).await;
            self.frontier.complete().await;

            if batch.len() >= self.config.batch_size {
                self.flush(&mut batch).await;
            }
        }

        self.flush(&mut batch).await;
        tracing::debug!("Worker {} finished", self.id);
    }

    /// Fetches and normalizes one title, queueing its links if accepted
    async fn process(&self, entry: &FrontierEntry, batch: &mut Vec<Document>) {
        let raw = match self.fetcher.fetch(&entry.title).await {
            Ok(raw) => raw,
            Err(e) => {
                match e.kind {
                    FetchErrorKind::Skip => {
                        CrawlCounters::bump(&self.counters.skipped);
                        tracing::debug!("Skipped '{}': {}", e.title, e.reason);
                    }
                    FetchErrorKind::Unavailable => {
                        CrawlCounters::bump(&self.counters.unavailable);
                        tracing::warn!("Gave up on '{}': {}", e.title, e.reason);
                    }
                }
                return;
            }
        };
        CrawlCounters::bump(&self.counters.fetched);

        let document = match self.normalizer.normalize(&raw) {
            Ok(document) => document,
            Err(reason) => {
                CrawlCounters::bump(&self.counters.rejected);
                tracing::debug!("Rejected '{}': {}", entry.title, reason);
                return;
            }
        };

        // Redirects can land several titles on one article
        if document.title != entry.title && !self.frontier.mark_visited(&document.title).await {
            CrawlCounters::bump(&self.counters.duplicates);
            tracing::debug!(
                "'{}' resolved to already seen '{}'",
                entry.title,
                document.title
            );
            return;
        }

        if entry.depth < self.config.max_depth {
            let mut queued = 0;
            for link in outbound_links(&raw)
                .into_iter()
                .take(self.config.links_per_article)
            {
                let next = FrontierEntry {
                    title: link,
                    depth: entry.depth + 1,
                    origin: entry.origin.clone(),
                };
                if self.frontier.enqueue(next).await {
                    queued += 1;
                }
            }
            CrawlCounters::add(&self.counters.discovered, queued);
        }

        batch.push(document);
        let accepted = CrawlCounters::bump(&self.counters.accepted);

        if accepted % PROGRESS_INTERVAL == 0 {
            tracing::info!(
                "Progress: {} accepted, {} in frontier",
                accepted,
                self.frontier.len().await
            );
        }

        if accepted >= self.config.article_quota as u64 && !self.frontier.is_closed().await {
            tracing::info!("Article quota of {} reached", self.config.article_quota);
            self.frontier.close().await;
        }
    }

    /// Writes the batch to the store, retrying once before dropping it
    async fn flush(&self, batch: &mut Vec<Document>) {
        if batch.is_empty() {
            return;
        }
        let documents = std::mem::take(batch);

        for attempt in 1..=FLUSH_ATTEMPTS {
            let result = {
                let mut store = self.store.lock().await;
                store.insert_batch(&documents)
            };

            match result {
                Ok(inserted) => {
                    CrawlCounters::add(&self.counters.persisted, inserted as u64);
                    CrawlCounters::add(
                        &self.counters.duplicates,
                        (documents.len() - inserted) as u64,
                    );
                    tracing::debug!(
                        "Worker {} stored {} of {} documents",
                        self.id,
                        inserted,
                        documents.len()
                    );
                    return;
                }
                Err(e) if attempt < FLUSH_ATTEMPTS => {
                    tracing::warn!("Batch write failed, retrying: {}", e);
                }
                Err(e) => {
                    tracing::error!(
                        "Dropping batch of {} documents after failed retry: {}",
                        documents.len(),
                        e
                    );
                    CrawlCounters::bump(&self.counters.failed_batches);
                    CrawlCounters::add(&self.counters.lost_documents, documents.len() as u64);
                }
            }
        }
    }
}

/// Runs a complete crawl against Wikipedia
///
/// This is the main entry point for crawling. It will:
/// 1. Open the document store
/// 2. Build the HTTP client
/// 3. Seed the frontier, skipping stored articles
/// 4. Run the worker pool
/// 5. Record the run
///
/// # Arguments
///
/// * `config` - The full configuration
/// * `config_hash` - Hash of the configuration file, recorded with the run
/// * `cancel` - Cancelling this token stops the crawl gracefully
///
/// # Example
///
/// ```no_run
/// use wikidex::config::load_config_with_hash;
/// use wikidex::crawler::run_crawl;
/// use tokio_util::sync::CancellationToken;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let report = run_crawl(config, hash, CancellationToken::new()).await?;
/// println!("{} articles stored", report.persisted);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: String,
    cancel: CancellationToken,
) -> Result<CrawlReport, WikidexError> {
    let store = open_storage(Path::new(&config.output.database_path))?;
    let gate = Arc::new(RateGate::new(Duration::from_millis(
        config.crawler.rate_interval_ms,
    )));
    let source = WikipediaClient::new(
        &config.source,
        &config.user_agent,
        Duration::from_secs(config.crawler.request_timeout_secs),
        gate,
    )?;

    let crawler = Crawler::new(
        config.crawler,
        config.seeds,
        config.quality,
        Arc::new(Mutex::new(store)),
        Arc::new(source),
    )?
    .with_config_hash(config_hash)
    .with_cancel_token(cancel);

    crawler.seed().await?;
    crawler.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::source::{Attempt, CategoryMember, RawArticle, SkipReason};
    use crate::storage::{
        RunRecord, SqliteStorage, StorageError, StorageResult, TextField, WordCountStats,
    };
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;

    fn body(title: &str) -> String {
        format!(
            "<p>{} is an article about a topic with enough words to pass the checks.</p>",
            title
        )
    }

    /// In-memory link graph
    #[derive(Default)]
    struct GraphSource {
        links: HashMap<String, Vec<String>>,
        missing: HashSet<String>,
        categories: HashMap<String, Vec<CategoryMember>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl GraphSource {
        fn with_articles(titles: &[&str]) -> Self {
            let mut source = Self::default();
            for title in titles {
                source.links.insert(title.to_string(), Vec::new());
            }
            source
        }

        fn link(mut self, from: &str, to: &[&str]) -> Self {
            self.links
                .insert(from.to_string(), to.iter().map(|t| t.to_string()).collect());
            self
        }
    }

    #[async_trait]
    impl ArticleSource for GraphSource {
        async fn attempt(&self, title: &str) -> Attempt<RawArticle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.missing.contains(title) {
                return Attempt::Fatal(SkipReason::NotFound);
            }
            match self.links.get(title) {
                Some(links) => Attempt::Fetched(RawArticle {
                    title: title.to_string(),
                    summary: format!("{} summary text", title),
                    html: body(title),
                    url: format!("https://example.org/wiki/{}", title),
                    links: links.clone(),
                }),
                None => Attempt::Fatal(SkipReason::NotFound),
            }
        }

        async fn category_members(
            &self,
            category: &str,
            limit: usize,
        ) -> Attempt<Vec<CategoryMember>> {
            let mut members = self.categories.get(category).cloned().unwrap_or_default();
            members.truncate(limit);
            Attempt::Fetched(members)
        }
    }

    /// Store whose first `failures` batch writes fail
    struct FlakyStore {
        inner: SqliteStorage,
        failures: usize,
        attempts: usize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: SqliteStorage::new_in_memory().unwrap(),
                failures,
                attempts: 0,
            }
        }
    }

    impl DocumentStore for FlakyStore {
        fn insert_batch(&mut self, documents: &[Document]) -> StorageResult<usize> {
            self.attempts += 1;
            if self.attempts <= self.failures {
                return Err(StorageError::Serialization("disk full".to_string()));
            }
            self.inner.insert_batch(documents)
        }

        fn snapshot_all(&self) -> StorageResult<Vec<Document>> {
            self.inner.snapshot_all()
        }

        fn get_by_id(&self, id: &str) -> StorageResult<Document> {
            self.inner.get_by_id(id)
        }

        fn full_text_search(
            &self,
            query: &str,
            fields: &[TextField],
            limit: usize,
        ) -> StorageResult<Vec<(String, f64)>> {
            self.inner.full_text_search(query, fields, limit)
        }

        fn existing_ids(&self) -> StorageResult<HashSet<String>> {
            self.inner.existing_ids()
        }

        fn count_documents(&self) -> StorageResult<u64> {
            self.inner.count_documents()
        }

        fn title_search(&self, query: &str, limit: usize) -> StorageResult<Vec<(String, f64)>> {
            self.inner.title_search(query, limit)
        }

        fn recent(&self, limit: usize) -> StorageResult<Vec<Document>> {
            self.inner.recent(limit)
        }

        fn word_count_stats(&self) -> StorageResult<Option<WordCountStats>> {
            self.inner.word_count_stats()
        }

        fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
            self.inner.create_run(config_hash)
        }

        fn finish_run(
            &mut self,
            run_id: i64,
            status: RunStatus,
            accepted: u64,
            persisted: u64,
        ) -> StorageResult<()> {
            self.inner.finish_run(run_id, status, accepted, persisted)
        }

        fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
            self.inner.latest_run()
        }
    }

    fn crawler_config(workers: usize, quota: usize) -> CrawlerConfig {
        let mut config = CrawlerConfig::new(workers, quota);
        config.rate_interval_ms = 1;
        config.retry_backoff_ms = 1;
        config.max_retries = 1;
        config.batch_size = 4;
        config
    }

    fn quality() -> QualityConfig {
        QualityConfig {
            min_word_count: 5,
            min_content_chars: 20,
            min_summary_chars: 5,
            summary_max_chars: 200,
            skip_patterns: vec!["may refer to".to_string(), "List of".to_string()],
        }
    }

    fn seeds(titles: &[&str]) -> SeedConfig {
        SeedConfig {
            titles: titles.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn crawler<S: DocumentStore + 'static>(
        config: CrawlerConfig,
        seeds: SeedConfig,
        store: Arc<Mutex<S>>,
        source: GraphSource,
    ) -> Crawler<S> {
        Crawler::new(config, seeds, quality(), store, Arc::new(source)).unwrap()
    }

    fn memory_store() -> Arc<Mutex<SqliteStorage>> {
        Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()))
    }

    const TEN: [&str; 10] = [
        "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India",
        "Juliett",
    ];

    #[tokio::test]
    async fn test_ten_seeds_three_workers() {
        let store = memory_store();
        let crawler = crawler(
            crawler_config(3, 100),
            seeds(&TEN),
            store.clone(),
            GraphSource::with_articles(&TEN),
        );

        assert_eq!(crawler.seed().await.unwrap(), 10);
        let report = crawler.run().await.unwrap();

        assert_eq!(report.accepted, 10);
        assert_eq!(report.persisted, 10);
        assert_eq!(report.duplicates, 0);
        assert!(!report.cancelled);

        let store = store.lock().await;
        let stored = store.snapshot_all().unwrap();
        let titles: HashSet<_> = stored.iter().map(|d| d.title.clone()).collect();
        assert_eq!(stored.len(), 10);
        assert_eq!(titles.len(), 10);

        let run = store.latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.persisted, 10);
    }

    #[tokio::test]
    async fn test_links_are_followed_once() {
        let source = GraphSource::with_articles(&["Hub", "A", "B", "C"])
            .link("Hub", &["A", "B", "C", "Category:Hidden"])
            .link("A", &["Hub", "B"])
            .link("B", &["C", "A"]);
        let store = memory_store();
        let crawler = crawler(crawler_config(4, 100), seeds(&["Hub"]), store.clone(), source);

        crawler.seed().await.unwrap();
        let report = crawler.run().await.unwrap();

        assert_eq!(report.accepted, 4);
        assert_eq!(report.persisted, 4);
        assert_eq!(report.discovered, 3);
        assert_eq!(store.lock().await.count_documents().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let source = GraphSource::with_articles(&["Root", "Child", "Grandchild"])
            .link("Root", &["Child"])
            .link("Child", &["Grandchild"]);
        let mut config = crawler_config(1, 100);
        config.max_depth = 1;

        let crawler = crawler(config, seeds(&["Root"]), memory_store(), source);
        crawler.seed().await.unwrap();
        let report = crawler.run().await.unwrap();

        assert_eq!(report.accepted, 2);
    }

    #[tokio::test]
    async fn test_quota_stops_crawl() {
        let store = memory_store();
        let crawler = crawler(
            crawler_config(1, 3),
            seeds(&TEN),
            store.clone(),
            GraphSource::with_articles(&TEN),
        );

        crawler.seed().await.unwrap();
        let report = crawler.run().await.unwrap();

        assert_eq!(report.accepted, 3);
        assert_eq!(report.persisted, 3);
        assert_eq!(report.pending, 7);
        assert_eq!(store.lock().await.count_documents().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_quota_overshoot_bounded_by_workers() {
        let crawler = crawler(
            crawler_config(4, 2),
            seeds(&TEN),
            memory_store(),
            GraphSource::with_articles(&TEN),
        );

        crawler.seed().await.unwrap();
        let report = crawler.run().await.unwrap();

        assert!(report.accepted >= 2);
        assert!(report.accepted <= 6);
        assert_eq!(report.persisted, report.accepted);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let mut source = GraphSource::with_articles(&["Good", "List of things"]);
        source.missing.insert("Gone".to_string());
        let crawler = crawler(
            crawler_config(2, 100),
            seeds(&["Good", "Gone", "List of things", "Template:Box"]),
            memory_store(),
            source,
        );

        crawler.seed().await.unwrap();
        let report = crawler.run().await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.persisted, 1);
    }

    #[tokio::test]
    async fn test_existing_documents_not_refetched() {
        let store = memory_store();
        let first = crawler(
            crawler_config(2, 100),
            seeds(&["Alpha", "Bravo"]),
            store.clone(),
            GraphSource::with_articles(&["Alpha", "Bravo"]),
        );
        first.seed().await.unwrap();
        first.run().await.unwrap();

        let source = Arc::new(GraphSource::with_articles(&["Alpha", "Bravo", "Charlie"]));
        let second = Crawler::new(
            crawler_config(2, 100),
            seeds(&["Alpha", "Bravo", "Charlie"]),
            quality(),
            store.clone(),
            source.clone(),
        )
        .unwrap();

        assert_eq!(second.seed().await.unwrap(), 1);
        let report = second.run().await.unwrap();

        assert_eq!(report.persisted, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.lock().await.count_documents().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_category_seeding() {
        let mut source = GraphSource::with_articles(&["Quark", "Lepton", "Boson"]);
        source.categories.insert(
            "Category:Particles".to_string(),
            vec![
                CategoryMember {
                    title: "Quark".to_string(),
                    ns: ARTICLE_NAMESPACE,
                },
                CategoryMember {
                    title: "Category:Force carriers".to_string(),
                    ns: CATEGORY_NAMESPACE,
                },
                CategoryMember {
                    title: "Lepton".to_string(),
                    ns: ARTICLE_NAMESPACE,
                },
            ],
        );
        source.categories.insert(
            "Category:Force carriers".to_string(),
            vec![CategoryMember {
                title: "Boson".to_string(),
                ns: ARTICLE_NAMESPACE,
            }],
        );

        let crawler = crawler(
            crawler_config(2, 100),
            SeedConfig {
                categories: vec!["Category:Particles".to_string()],
                ..Default::default()
            },
            memory_store(),
            source,
        );

        assert_eq!(crawler.seed().await.unwrap(), 3);
        let report = crawler.run().await.unwrap();
        assert_eq!(report.accepted, 3);
    }

    #[tokio::test]
    async fn test_cancellation_flushes_accepted_documents() {
        let titles: Vec<String> = (0..200).map(|i| format!("Article {}", i)).collect();
        let refs: Vec<&str> = titles.iter().map(|t| t.as_str()).collect();
        let mut source = GraphSource::with_articles(&refs);
        source.delay = Duration::from_millis(10);

        let store = memory_store();
        let mut config = crawler_config(3, 1000);
        config.batch_size = 100;
        let crawler = crawler(config, seeds(&refs), store.clone(), source);
        crawler.seed().await.unwrap();

        let cancel = crawler.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });

        let report = crawler.run().await.unwrap();

        assert!(report.cancelled);
        assert!(report.accepted > 0);
        assert!(report.accepted < 200);
        assert_eq!(report.persisted, report.accepted);

        let store = store.lock().await;
        assert_eq!(store.count_documents().unwrap(), report.accepted);
        assert_eq!(
            store.latest_run().unwrap().unwrap().status,
            RunStatus::Interrupted
        );
    }

    #[tokio::test]
    async fn test_failed_flush_retried_once() {
        let store = Arc::new(Mutex::new(FlakyStore::new(1)));
        let crawler = crawler(
            crawler_config(1, 100),
            seeds(&["Alpha", "Bravo"]),
            store.clone(),
            GraphSource::with_articles(&["Alpha", "Bravo"]),
        );

        crawler.seed().await.unwrap();
        let report = crawler.run().await.unwrap();

        assert_eq!(report.persisted, 2);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(store.lock().await.attempts, 2);
    }

    #[tokio::test]
    async fn test_failed_batch_dropped_after_retry() {
        let store = Arc::new(Mutex::new(FlakyStore::new(2)));
        let crawler = crawler(
            crawler_config(1, 100),
            seeds(&["Alpha", "Bravo"]),
            store.clone(),
            GraphSource::with_articles(&["Alpha", "Bravo"]),
        );

        crawler.seed().await.unwrap();
        let report = crawler.run().await.unwrap();

        assert_eq!(report.accepted, 2);
        assert_eq!(report.persisted, 0);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.lost_documents, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = Crawler::new(
            CrawlerConfig::new(0, 10),
            seeds(&["Alpha"]),
            quality(),
            memory_store(),
            Arc::new(GraphSource::default()),
        );
        assert!(matches!(result, Err(WikidexError::Config(_))));
    }
}
