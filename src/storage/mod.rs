//! Storage module for persisting crawled documents
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Batched, idempotent document insertion keyed on the title
//! - Corpus snapshots for index rebuilds
//! - Lexical full-text search through FTS5
//! - Title lookup, recent additions and word-count aggregates
//! - Crawl run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{DocumentStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use std::path::Path;

/// Opens or creates the document store at `path`
///
/// A failure here is fatal for the caller: nothing can be crawled or
/// searched without a store.
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A normalized article, immutable once persisted
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Stable external key (the article title)
    pub title: String,
    /// Raw markup as returned by the source
    pub content: String,
    /// Markup-free text
    pub clean_text: String,
    pub summary: String,
    pub word_count: usize,
    /// Canonical page URL
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Word-count aggregates over the stored corpus
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordCountStats {
    pub average: f64,
    pub min: usize,
    pub max: usize,
}

/// Columns available to lexical search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Title,
    Summary,
    CleanText,
}

impl TextField {
    /// All searchable columns
    pub const ALL: [TextField; 3] = [TextField::Title, TextField::Summary, TextField::CleanText];

    pub fn column(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Summary => "summary",
            Self::CleanText => "clean_content",
        }
    }
}

/// Represents a crawl run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub accepted: u64,
    pub persisted: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}
