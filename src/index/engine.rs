//! Similarity engine over the current term-document matrix
//!
//! The engine serves queries from an immutable [`IndexSnapshot`] and swaps
//! in a new snapshot when a rebuild finishes. Readers clone the snapshot
//! pointer and never wait on a build. Every build takes a generation number
//! up front, and a finished build is only installed if no newer one has
//! been installed already.

use crate::config::IndexConfig;
use crate::index::matrix::{SparseRow, TermDocumentMatrix};
use crate::index::vectorizer::build_index;
use crate::index::SearchError;
use crate::storage::DocumentStore;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// A ranked `(title, score)` pair
pub type ScoredId = (String, f64);

/// An installed matrix and when it was built
#[derive(Debug)]
pub struct IndexSnapshot {
    pub matrix: TermDocumentMatrix,
    pub generation: u64,
    pub built_at: DateTime<Utc>,
}

/// Whether queries can be served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Empty,
    Ready { generation: u64 },
}

/// Result of a rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub generation: u64,
    /// False when a newer build was installed first
    pub installed: bool,
    pub documents: usize,
    pub terms: usize,
}

/// Vector-space search over stored documents
#[derive(Debug)]
pub struct SimilarityEngine {
    config: IndexConfig,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    generation: AtomicU64,
}

impl SimilarityEngine {
    /// Creates an engine with no index
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        match self.current() {
            Some(snapshot) => EngineState::Ready {
                generation: snapshot.generation,
            },
            None => EngineState::Empty,
        }
    }

    /// The currently installed snapshot
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>, SearchError> {
        self.current().ok_or(SearchError::IndexNotBuilt)
    }

    fn current(&self) -> Option<Arc<IndexSnapshot>> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Reserves the generation number for a new build
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Installs a matrix built under `generation`
    ///
    /// Returns `false`, leaving the current snapshot in place, when a
    /// snapshot of the same or a newer generation is already installed.
    pub fn install(&self, matrix: TermDocumentMatrix, generation: u64) -> bool {
        let snapshot = Arc::new(IndexSnapshot {
            matrix,
            generation,
            built_at: Utc::now(),
        });

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = guard.as_ref() {
            if existing.generation >= generation {
                tracing::debug!(
                    "Discarding index generation {}, generation {} is newer",
                    generation,
                    existing.generation
                );
                return false;
            }
        }
        *guard = Some(snapshot);
        // keep later builds numbered above anything installed from outside
        self.generation.fetch_max(generation, Ordering::SeqCst);
        true
    }

    /// Rebuilds the index from the store's current contents
    ///
    /// The store is read once under its lock and the matrix is built on the
    /// blocking pool. Queries keep using the previous snapshot meanwhile.
    pub async fn rebuild<S: DocumentStore + 'static>(
        &self,
        store: &Mutex<S>,
    ) -> Result<RebuildOutcome, SearchError> {
        let generation = self.next_generation();
        let documents = store.lock().await.snapshot_all()?;
        let config = self.config.clone();

        tracing::info!(
            "Rebuilding index generation {} over {} documents",
            generation,
            documents.len()
        );

        let matrix = tokio::task::spawn_blocking(move || build_index(&documents, &config))
            .await
            .map_err(|e| SearchError::Build(e.to_string()))?;

        let outcome = RebuildOutcome {
            generation,
            installed: false,
            documents: matrix.len(),
            terms: matrix.vocabulary().len(),
        };
        let installed = self.install(matrix, generation);

        Ok(RebuildOutcome {
            installed,
            ..outcome
        })
    }

    /// Documents most similar to free text
    ///
    /// Returns at most `k` hits scoring above the search floor, best first,
    /// ties broken by ascending title. Text sharing no indexed term yields
    /// an empty list.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredId>, SearchError> {
        let snapshot = self.snapshot()?;
        let matrix = &snapshot.matrix;

        let query_row = matrix.project(query);
        if query_row.is_empty() {
            return Ok(Vec::new());
        }

        Ok(rank(
            matrix,
            &query_row,
            None,
            f64::from(self.config.min_search_score),
            k,
        ))
    }

    /// Documents most similar to a stored document, excluding itself
    pub fn related(&self, doc_id: &str, k: usize) -> Result<Vec<ScoredId>, SearchError> {
        let snapshot = self.snapshot()?;
        let matrix = &snapshot.matrix;

        let position = matrix
            .position(doc_id)
            .ok_or_else(|| SearchError::NotFound(doc_id.to_string()))?;

        Ok(rank(
            matrix,
            matrix.row(position),
            Some(position),
            f64::from(self.config.min_related_score),
            k,
        ))
    }

    /// Vocabulary terms starting with `prefix`, heaviest first
    ///
    /// The prefix is matched case-insensitively. A blank prefix yields
    /// nothing.
    pub fn suggest(&self, prefix: &str, k: usize) -> Result<Vec<String>, SearchError> {
        let snapshot = self.snapshot()?;
        let vocabulary = snapshot.matrix.vocabulary();

        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<usize> = vocabulary.prefix_range(&prefix).collect();
        candidates.sort_by(|&a, &b| {
            vocabulary
                .corpus_weight(b)
                .total_cmp(&vocabulary.corpus_weight(a))
                .then_with(|| a.cmp(&b))
        });

        Ok(candidates
            .into_iter()
            .take(k)
            .map(|column| vocabulary.term(column).to_string())
            .collect())
    }
}

/// Scores every row against `query` and keeps the best `k`
///
/// Rows are ordered by title, so comparing row positions breaks ties by
/// ascending title.
fn rank(
    matrix: &TermDocumentMatrix,
    query: &SparseRow,
    exclude: Option<usize>,
    floor: f64,
    k: usize,
) -> Vec<ScoredId> {
    let floor = floor.max(0.0);

    let mut scored: Vec<(usize, f64)> = matrix
        .rows()
        .iter()
        .enumerate()
        .filter(|(position, _)| Some(*position) != exclude)
        .map(|(position, row)| (position, row.dot(query)))
        .filter(|&(_, score)| score > floor)
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(position, score)| (matrix.doc_ids()[position].clone(), score))
        .collect()
}
