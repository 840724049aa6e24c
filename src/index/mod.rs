//! Vector-space index over stored documents
//!
//! This module contains:
//! - The tokenizer shared by index builds and queries
//! - The TF-IDF indexer producing a term-document matrix
//! - The similarity engine serving search, related and suggest queries

mod engine;
mod matrix;
mod tokenizer;
mod vectorizer;

pub use engine::{EngineState, IndexSnapshot, RebuildOutcome, ScoredId, SimilarityEngine};
pub use matrix::{SparseRow, TermDocumentMatrix, Vocabulary};
pub use tokenizer::{is_stop_word, Tokenizer, STOP_WORDS};
pub use vectorizer::{build_index, smoothed_idf};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur while building or querying the index
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Index has not been built yet")]
    IndexNotBuilt,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index build failed: {0}")]
    Build(String),

    #[error("Corrupt index file: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
