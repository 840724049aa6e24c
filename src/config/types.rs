use serde::Deserialize;

/// Main configuration structure for Wikidex
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub seeds: SeedConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub index: IndexConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent crawl workers
    pub workers: usize,

    /// Number of accepted articles after which the crawl stops taking new work
    #[serde(rename = "article-quota")]
    pub article_quota: usize,

    /// Number of documents persisted per store transaction
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Minimum time between any two requests to the source (milliseconds)
    #[serde(rename = "rate-interval-ms", default = "default_rate_interval_ms")]
    pub rate_interval_ms: u64,

    /// Retries after the first attempt for transient failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff before the first retry, doubled for each further retry (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Outbound links enqueued per accepted article
    #[serde(rename = "links-per-article", default = "default_links_per_article")]
    pub links_per_article: usize,

    /// Upper bound on pending frontier entries
    #[serde(rename = "max-queue", default = "default_max_queue")]
    pub max_queue: usize,

    /// Maximum link distance from a seed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,
}

impl CrawlerConfig {
    /// Creates a crawler configuration with defaults for everything but the pool size and quota
    pub fn new(workers: usize, article_quota: usize) -> Self {
        Self {
            workers,
            article_quota,
            batch_size: default_batch_size(),
            rate_interval_ms: default_rate_interval_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            links_per_article: default_links_per_article(),
            max_queue: default_max_queue(),
            max_depth: default_max_depth(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Endpoints of the article source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Base of the REST API (page summaries)
    #[serde(rename = "rest-base-url", default = "default_rest_base_url")]
    pub rest_base_url: String,

    /// Action API endpoint (parsed content, links, category members)
    #[serde(rename = "action-base-url", default = "default_action_base_url")]
    pub action_base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            rest_base_url: default_rest_base_url(),
            action_base_url: default_action_base_url(),
        }
    }
}

/// Where the crawl starts
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Article titles enqueued directly
    #[serde(default)]
    pub titles: Vec<String>,

    /// Categories whose members are enqueued
    #[serde(default)]
    pub categories: Vec<String>,

    /// Maximum members read from one category
    #[serde(rename = "category-limit", default = "default_category_limit")]
    pub category_limit: usize,

    /// Maximum members read from each subcategory
    #[serde(rename = "subcategory-limit", default = "default_subcategory_limit")]
    pub subcategory_limit: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            titles: Vec::new(),
            categories: Vec::new(),
            category_limit: default_category_limit(),
            subcategory_limit: default_subcategory_limit(),
        }
    }
}

/// Article quality policy applied by the normalizer
#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    /// Minimum words of clean text
    #[serde(rename = "min-word-count", default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Minimum length of the raw markup (characters)
    #[serde(rename = "min-content-chars", default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Minimum length of the summary (characters)
    #[serde(rename = "min-summary-chars", default = "default_min_summary_chars")]
    pub min_summary_chars: usize,

    /// Longest summary derived from the body when the source gives none
    #[serde(rename = "summary-max-chars", default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Case-insensitive substrings of title or summary that reject an article
    #[serde(rename = "skip-patterns", default = "default_skip_patterns")]
    pub skip_patterns: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_word_count: default_min_word_count(),
            min_content_chars: default_min_content_chars(),
            min_summary_chars: default_min_summary_chars(),
            summary_max_chars: default_summary_max_chars(),
            skip_patterns: default_skip_patterns(),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexConfig {
    /// Vocabulary cap after document-frequency pruning
    #[serde(rename = "max-features", default = "default_max_features")]
    pub max_features: usize,

    /// Smallest n-gram length
    #[serde(rename = "ngram-min", default = "default_ngram_min")]
    pub ngram_min: usize,

    /// Largest n-gram length
    #[serde(rename = "ngram-max", default = "default_ngram_max")]
    pub ngram_max: usize,

    /// Minimum number of documents a term must appear in
    #[serde(rename = "min-df", default = "default_min_df")]
    pub min_df: usize,

    /// Maximum fraction of documents a term may appear in
    #[serde(rename = "max-df", default = "default_max_df")]
    pub max_df: f64,

    /// How many times the title is repeated ahead of the body
    #[serde(rename = "title-boost", default = "default_title_boost")]
    pub title_boost: usize,

    /// Vector search hits at or below this score are dropped
    #[serde(rename = "min-search-score", default = "default_min_search_score")]
    pub min_search_score: f32,

    /// Related-document hits at or below this score are dropped
    #[serde(rename = "min-related-score", default = "default_min_related_score")]
    pub min_related_score: f32,

    /// File the built matrix is persisted to
    #[serde(rename = "index-path", default)]
    pub index_path: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            min_df: default_min_df(),
            max_df: default_max_df(),
            title_boost: default_title_boost(),
            min_search_score: default_min_search_score(),
            min_related_score: default_min_related_score(),
            index_path: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_batch_size() -> usize {
    100
}

fn default_rate_interval_ms() -> u64 {
    200
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_links_per_article() -> usize {
    10
}

fn default_max_queue() -> usize {
    50_000
}

fn default_max_depth() -> u32 {
    6
}

fn default_rest_base_url() -> String {
    "https://en.wikipedia.org/api/rest_v1".to_string()
}

fn default_action_base_url() -> String {
    "https://en.wikipedia.org/w/api.php".to_string()
}

fn default_category_limit() -> usize {
    500
}

fn default_subcategory_limit() -> usize {
    50
}

fn default_min_word_count() -> usize {
    150
}

fn default_min_content_chars() -> usize {
    1000
}

fn default_min_summary_chars() -> usize {
    100
}

fn default_summary_max_chars() -> usize {
    500
}

fn default_skip_patterns() -> Vec<String> {
    [
        "disambiguation",
        "may refer to",
        "list of",
        "index of",
        "category:",
        "template:",
        "file:",
        "portal:",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_features() -> usize {
    10_000
}

fn default_ngram_min() -> usize {
    1
}

fn default_ngram_max() -> usize {
    2
}

fn default_min_df() -> usize {
    2
}

fn default_max_df() -> f64 {
    0.8
}

fn default_title_boost() -> usize {
    3
}

fn default_min_search_score() -> f32 {
    0.01
}

fn default_min_related_score() -> f32 {
    0.1
}
