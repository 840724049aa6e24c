//! Query surface over the document store and the vector index
//!
//! [`SearchService`] is what front ends talk to. It routes text queries to
//! the store's full-text index, its title lookup or the similarity engine,
//! hydrates hits with their stored fields, and owns index rebuilds and
//! persistence.

use crate::config::IndexConfig;
use crate::index::{EngineState, RebuildOutcome, ScoredId, SimilarityEngine, TermDocumentMatrix};
use crate::storage::{Document, DocumentStore, RunRecord, StorageError, TextField, WordCountStats};
use crate::WikidexError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Number of vocabulary terms listed in [`IndexStats`]
const SAMPLE_TERMS: usize = 10;

/// How a text query is answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    /// BM25 ranking over the store's full-text index
    Lexical,
    /// Title match: exact, then prefix, then substring
    Title,
    /// Cosine similarity over the TF-IDF matrix
    #[default]
    Vector,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "fts" | "text" => Ok(Self::Lexical),
            "title" => Ok(Self::Title),
            "vector" | "tfidf" | "tf-idf" => Ok(Self::Vector),
            other => Err(format!(
                "unknown search mode '{}', expected 'lexical', 'title' or 'vector'",
                other
            )),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => write!(f, "lexical"),
            Self::Title => write!(f, "title"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

/// A ranked document with its stored fields
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub word_count: usize,
    /// Higher is better; scales differ between modes
    pub score: f64,
}

/// Corpus and index statistics
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    /// Documents in the store
    pub documents: u64,
    /// Word-count spread of the stored documents
    pub word_counts: Option<WordCountStats>,
    /// Documents covered by the installed index
    pub indexed_documents: usize,
    pub vocabulary_size: usize,
    pub generation: Option<u64>,
    pub last_rebuild: Option<DateTime<Utc>>,
    /// Stored matrix weights
    pub nnz: usize,
    pub density: f64,
    /// Heaviest vocabulary terms
    pub sample_terms: Vec<String>,
    pub last_run: Option<RunRecord>,
}

/// Search, related, suggest, stats and rebuild over one store
pub struct SearchService<S: DocumentStore + 'static> {
    store: Arc<Mutex<S>>,
    engine: Arc<SimilarityEngine>,
    index_path: Option<PathBuf>,
    /// Generation last written to `index_path`
    persisted: Mutex<u64>,
}

impl<S: DocumentStore + 'static> SearchService<S> {
    /// Creates a service with an empty engine
    pub fn new(store: Arc<Mutex<S>>, config: IndexConfig) -> Self {
        let index_path = config.index_path.as_ref().map(PathBuf::from);
        Self {
            store,
            engine: Arc::new(SimilarityEngine::new(config)),
            index_path,
            persisted: Mutex::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<SimilarityEngine> {
        &self.engine
    }

    /// Makes the engine ready
    ///
    /// Loads the persisted matrix when one is configured and readable,
    /// otherwise rebuilds from the store.
    pub async fn open_index(&self) -> Result<EngineState, WikidexError> {
        if let Some(path) = &self.index_path {
            if path.exists() {
                match TermDocumentMatrix::load(path) {
                    Ok(matrix) => {
                        tracing::info!(
                            "Loaded index from {} ({} documents, {} terms)",
                            path.display(),
                            matrix.len(),
                            matrix.vocabulary().len()
                        );
                        let generation = self.engine.next_generation();
                        if self.engine.install(matrix, generation) {
                            let mut persisted = self.persisted.lock().await;
                            *persisted = (*persisted).max(generation);
                        }
                        return Ok(self.engine.state());
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Could not load index from {}, rebuilding: {}",
                            path.display(),
                            e
                        );
                    }
                }
            }
        }

        self.rebuild().await?;
        Ok(self.engine.state())
    }

    /// Ranked documents for free text
    pub async fn search(
        &self,
        text: &str,
        mode: SearchMode,
        limit: usize,
    ) -> Result<Vec<SearchHit>, WikidexError> {
        let scored = match mode {
            SearchMode::Lexical => {
                let store = self.store.lock().await;
                store.full_text_search(text, &TextField::ALL, limit)?
            }
            SearchMode::Title => {
                let store = self.store.lock().await;
                store.title_search(text, limit)?
            }
            SearchMode::Vector => self.engine.search(text, limit)?,
        };

        tracing::debug!("{} search for '{}' found {} hits", mode, text, scored.len());
        self.hydrate(scored).await
    }

    /// Documents similar to a stored document
    pub async fn related(&self, title: &str, limit: usize) -> Result<Vec<SearchHit>, WikidexError> {
        let scored = self.engine.related(title, limit)?;
        self.hydrate(scored).await
    }

    /// Vocabulary completions for a prefix
    pub fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<String>, WikidexError> {
        Ok(self.engine.suggest(prefix, limit)?)
    }

    /// Corpus and index statistics
    ///
    /// Works before the index is built; index fields are then empty.
    pub async fn stats(&self) -> Result<IndexStats, WikidexError> {
        let (documents, word_counts, last_run) = {
            let store = self.store.lock().await;
            (
                store.count_documents()?,
                store.word_count_stats()?,
                store.latest_run()?,
            )
        };

        let mut stats = IndexStats {
            documents,
            word_counts,
            indexed_documents: 0,
            vocabulary_size: 0,
            generation: None,
            last_rebuild: None,
            nnz: 0,
            density: 0.0,
            sample_terms: Vec::new(),
            last_run,
        };

        if let Ok(snapshot) = self.engine.snapshot() {
            let matrix = &snapshot.matrix;
            let vocabulary = matrix.vocabulary();

            let mut columns: Vec<usize> = (0..vocabulary.len()).collect();
            columns.sort_by(|&a, &b| {
                vocabulary
                    .corpus_weight(b)
                    .total_cmp(&vocabulary.corpus_weight(a))
                    .then_with(|| a.cmp(&b))
            });

            stats.indexed_documents = matrix.len();
            stats.vocabulary_size = vocabulary.len();
            stats.generation = Some(snapshot.generation);
            stats.last_rebuild = Some(snapshot.built_at);
            stats.nnz = matrix.nnz();
            stats.density = matrix.density();
            stats.sample_terms = columns
                .into_iter()
                .take(SAMPLE_TERMS)
                .map(|column| vocabulary.term(column).to_string())
                .collect();
        }

        Ok(stats)
    }

    /// Rebuilds the index and persists it when a path is configured
    pub async fn rebuild(&self) -> Result<RebuildOutcome, WikidexError> {
        let outcome = self.engine.rebuild(self.store.as_ref()).await?;

        if outcome.installed {
            tracing::info!(
                "Index generation {} ready: {} documents, {} terms",
                outcome.generation,
                outcome.documents,
                outcome.terms
            );
            if let Some(path) = &self.index_path {
                self.persist(path).await?;
            }
        }

        Ok(outcome)
    }

    /// Writes the installed snapshot to `path` unless a newer or equal
    /// generation is already there
    async fn persist(&self, path: &Path) -> Result<(), WikidexError> {
        let mut persisted = self.persisted.lock().await;
        let snapshot = self.engine.snapshot()?;
        if snapshot.generation <= *persisted {
            tracing::debug!(
                "Index generation {} already saved, skipping generation {}",
                *persisted,
                snapshot.generation
            );
            return Ok(());
        }

        let generation = snapshot.generation;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || snapshot.matrix.save(&target)).await??;
        *persisted = generation;

        tracing::debug!("Saved index generation {} to {}", generation, path.display());
        Ok(())
    }

    /// The most recently stored documents, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<Document>, WikidexError> {
        let store = self.store.lock().await;
        Ok(store.recent(limit)?)
    }

    /// Attaches stored fields to scored titles, dropping titles the store
    /// no longer has
    async fn hydrate(&self, scored: Vec<ScoredId>) -> Result<Vec<SearchHit>, WikidexError> {
        let store = self.store.lock().await;
        let mut hits = Vec::with_capacity(scored.len());

        for (title, score) in scored {
            match store.get_by_id(&title) {
                Ok(document) => hits.push(SearchHit {
                    title: document.title,
                    summary: document.summary,
                    url: document.url,
                    word_count: document.word_count,
                    score,
                }),
                Err(StorageError::NotFound(_)) => {
                    tracing::debug!("Indexed document '{}' is missing from the store", title);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(hits)
    }
}
