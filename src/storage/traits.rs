//! Storage traits and error types
//!
//! This module defines the trait interface for document stores and
//! associated error types.

use crate::storage::{Document, RunRecord, RunStatus, TextField, WordCountStats};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored value: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for durable document stores
///
/// The crawler and search layers only talk to the store through this trait.
/// Identifier uniqueness is enforced by the store itself, so duplicate
/// inserts are harmless.
pub trait DocumentStore: Send {
    // ===== Documents =====

    /// Inserts a batch of documents in a single transaction
    ///
    /// Documents whose title already exists are skipped silently. Either
    /// the whole batch is applied or none of it is.
    ///
    /// # Returns
    ///
    /// The number of documents actually inserted
    fn insert_batch(&mut self, documents: &[Document]) -> StorageResult<usize>;

    /// Returns every stored document, ordered by title
    fn snapshot_all(&self) -> StorageResult<Vec<Document>>;

    /// Gets a document by its title
    fn get_by_id(&self, id: &str) -> StorageResult<Document>;

    /// Lexical search over the given fields
    ///
    /// # Returns
    ///
    /// `(title, score)` pairs, best first. Higher scores are better.
    fn full_text_search(
        &self,
        query: &str,
        fields: &[TextField],
        limit: usize,
    ) -> StorageResult<Vec<(String, f64)>>;

    /// Case-insensitive substring match on titles
    ///
    /// An exact title scores 3, a title starting with `query` scores 2 and
    /// any other match scores 1. Equal scores are ordered by title.
    fn title_search(&self, query: &str, limit: usize) -> StorageResult<Vec<(String, f64)>>;

    /// The most recently stored documents, newest first
    fn recent(&self, limit: usize) -> StorageResult<Vec<Document>>;

    /// Average, smallest and largest word count, or `None` for an empty store
    fn word_count_stats(&self) -> StorageResult<Option<WordCountStats>>;

    /// Titles of all stored documents
    fn existing_ids(&self) -> StorageResult<HashSet<String>>;

    /// Total number of stored documents
    fn count_documents(&self) -> StorageResult<u64>;

    // ===== Run Management =====

    /// Records the start of a crawl run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run finished with its final status and counts
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        accepted: u64,
        persisted: u64,
    ) -> StorageResult<()>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;
}
