//! Wikidex: a polite Wikipedia crawler with lexical and vector-space search
//!
//! This crate crawls a link-connected article corpus with a pool of
//! rate-limited workers, stores each accepted article exactly once, and
//! answers ranked queries over the stored corpus using either the store's
//! full-text index or a TF-IDF term-document matrix.

pub mod config;
pub mod crawler;
pub mod index;
pub mod output;
pub mod search;
pub mod storage;

use thiserror::Error;

/// Main error type for Wikidex operations
#[derive(Debug, Error)]
pub enum WikidexError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search error: {0}")]
    Search(#[from] index::SearchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Fatal: {0}")]
    Fatal(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Wikidex operations
pub type Result<T> = std::result::Result<T, WikidexError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, CrawlReport, Crawler};
pub use index::{build_index, SimilarityEngine, TermDocumentMatrix};
pub use search::{SearchMode, SearchService};
pub use storage::{Document, DocumentStore, SqliteStorage};
