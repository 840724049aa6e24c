//! Term-document matrix and its vocabulary
//!
//! The matrix is immutable once built. Rows are sparse, sorted by column and
//! L2-normalized, so the cosine similarity of two rows is their dot product.

use crate::index::tokenizer::Tokenizer;
use crate::index::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Distinguishes concurrent saves from one process
static SAVE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Returns true when every element is strictly greater than the one before
fn strictly_ascending<T: PartialOrd>(items: &[T]) -> bool {
    items.windows(2).all(|w| w[0] < w[1])
}

/// Sorted index terms with their statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: Vec<String>,
    idf: Vec<f64>,
    /// Sum of the term's normalized weights over every document
    corpus_weight: Vec<f64>,
}

impl Vocabulary {
    /// Creates a vocabulary from parallel columns
    ///
    /// `terms` must be sorted and unique.
    pub fn new(terms: Vec<String>, idf: Vec<f64>, corpus_weight: Vec<f64>) -> Self {
        debug_assert!(terms.windows(2).all(|w| w[0] < w[1]));
        debug_assert_eq!(terms.len(), idf.len());
        debug_assert_eq!(terms.len(), corpus_weight.len());
        Self {
            terms,
            idf,
            corpus_weight,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Column of a term
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.terms
            .binary_search_by(|candidate| candidate.as_str().cmp(term))
            .ok()
    }

    pub fn term(&self, column: usize) -> &str {
        &self.terms[column]
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn idf(&self, column: usize) -> f64 {
        self.idf[column]
    }

    pub fn corpus_weight(&self, column: usize) -> f64 {
        self.corpus_weight[column]
    }

    /// Columns of every term starting with `prefix`
    pub fn prefix_range(&self, prefix: &str) -> Range<usize> {
        let start = self.terms.partition_point(|term| term.as_str() < prefix);
        let len = self.terms[start..]
            .iter()
            .take_while(|term| term.starts_with(prefix))
            .count();
        start..start + len
    }
}

/// One sparse, normalized row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseRow {
    /// Columns in ascending order
    pub columns: Vec<u32>,
    pub values: Vec<f64>,
}

impl SparseRow {
    /// Builds an L2-normalized row from `(column, weight)` pairs sorted by column
    pub fn normalized(entries: Vec<(u32, f64)>) -> Self {
        let norm = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Self::default();
        }

        let (columns, values) = entries
            .into_iter()
            .filter(|(_, w)| *w != 0.0)
            .map(|(c, w)| (c, w / norm))
            .unzip();
        Self { columns, values }
    }

    pub fn nnz(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Dot product with another row
    pub fn dot(&self, other: &SparseRow) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.columns.len() && j < other.columns.len() {
            match self.columns[i].cmp(&other.columns[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// TF-IDF weights of every indexed document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermDocumentMatrix {
    vocabulary: Vocabulary,
    /// Document titles in ascending order, one per row
    doc_ids: Vec<String>,
    rows: Vec<SparseRow>,
    ngram_min: usize,
    ngram_max: usize,
}

impl TermDocumentMatrix {
    /// Creates a matrix from its parts
    ///
    /// `doc_ids` must be sorted and unique, with one row per id.
    pub fn new(
        vocabulary: Vocabulary,
        doc_ids: Vec<String>,
        rows: Vec<SparseRow>,
        tokenizer: Tokenizer,
    ) -> Self {
        debug_assert_eq!(doc_ids.len(), rows.len());
        let (ngram_min, ngram_max) = tokenizer.ngram_range();
        Self {
            vocabulary,
            doc_ids,
            rows,
            ngram_min,
            ngram_max,
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> &SparseRow {
        &self.rows[index]
    }

    pub fn rows(&self) -> &[SparseRow] {
        &self.rows
    }

    /// Row index of a document
    pub fn position(&self, doc_id: &str) -> Option<usize> {
        self.doc_ids
            .binary_search_by(|id| id.as_str().cmp(doc_id))
            .ok()
    }

    /// The tokenizer queries must use to match this matrix
    pub fn tokenizer(&self) -> Tokenizer {
        Tokenizer::new(self.ngram_min, self.ngram_max)
    }

    /// Total stored weights
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(SparseRow::nnz).sum()
    }

    /// Fraction of cells holding a weight
    pub fn density(&self) -> f64 {
        let cells = self.rows.len() * self.vocabulary.len();
        if cells == 0 {
            0.0
        } else {
            self.nnz() as f64 / cells as f64
        }
    }

    /// Maps text into this matrix's vector space
    ///
    /// Terms missing from the vocabulary contribute nothing. The result is
    /// normalized like the document rows, or empty when nothing matched.
    pub fn project(&self, text: &str) -> SparseRow {
        let mut counts: BTreeMap<usize, u32> = BTreeMap::new();
        for term in self.tokenizer().terms(text) {
            if let Some(column) = self.vocabulary.index_of(&term) {
                *counts.entry(column).or_insert(0) += 1;
            }
        }

        let entries = counts
            .into_iter()
            .map(|(column, tf)| (column as u32, f64::from(tf) * self.vocabulary.idf(column)))
            .collect();
        SparseRow::normalized(entries)
    }

    /// Writes the matrix as JSON
    ///
    /// The JSON goes to a temporary file beside `path`, which is then renamed
    /// over it. Readers see either the previous file or the complete new one.
    pub fn save(&self, path: &Path) -> Result<(), SearchError> {
        let temp = temp_path(path);
        let written = self.write_json(&temp).and_then(|()| {
            std::fs::rename(&temp, path)?;
            Ok(())
        });
        if written.is_err() {
            let _ = std::fs::remove_file(&temp);
        }
        written
    }

    fn write_json(&self, path: &Path) -> Result<(), SearchError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Reads a matrix written by [`TermDocumentMatrix::save`]
    ///
    /// Files that parse but break the matrix invariants are rejected with
    /// [`SearchError::Corrupt`].
    pub fn load(path: &Path) -> Result<Self, SearchError> {
        let file = File::open(path)?;
        let matrix: Self = serde_json::from_reader(BufReader::new(file))?;
        matrix.validate()?;
        Ok(matrix)
    }

    /// Checks every invariant lookups and dot products rely on
    fn validate(&self) -> Result<(), SearchError> {
        let corrupt = |reason: String| Err(SearchError::Corrupt(reason));
        let vocab = &self.vocabulary;

        if vocab.idf.len() != vocab.terms.len() || vocab.corpus_weight.len() != vocab.terms.len() {
            return corrupt(format!(
                "{} terms but {} idf values and {} corpus weights",
                vocab.terms.len(),
                vocab.idf.len(),
                vocab.corpus_weight.len()
            ));
        }
        if !strictly_ascending(&vocab.terms) {
            return corrupt("vocabulary terms are not sorted and unique".to_string());
        }
        if vocab.idf.iter().chain(&vocab.corpus_weight).any(|v| !v.is_finite()) {
            return corrupt("vocabulary holds a non-finite statistic".to_string());
        }

        if self.doc_ids.len() != self.rows.len() {
            return corrupt(format!(
                "{} documents but {} rows",
                self.doc_ids.len(),
                self.rows.len()
            ));
        }
        if !strictly_ascending(&self.doc_ids) {
            return corrupt("document ids are not sorted and unique".to_string());
        }
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            return corrupt(format!(
                "invalid n-gram range {}..={}",
                self.ngram_min, self.ngram_max
            ));
        }

        let width = vocab.len();
        for (doc_id, row) in self.doc_ids.iter().zip(&self.rows) {
            if row.columns.len() != row.values.len() {
                return corrupt(format!(
                    "row {:?} has {} columns but {} values",
                    doc_id,
                    row.columns.len(),
                    row.values.len()
                ));
            }
            if !strictly_ascending(&row.columns) {
                return corrupt(format!("row {:?} columns are not ascending", doc_id));
            }
            if row.columns.last().is_some_and(|&c| c as usize >= width) {
                return corrupt(format!(
                    "row {:?} references a column outside the vocabulary",
                    doc_id
                ));
            }
            if row.values.iter().any(|v| !v.is_finite()) {
                return corrupt(format!("row {:?} holds a non-finite weight", doc_id));
            }
        }

        Ok(())
    }
}

/// Temporary sibling of `path`, unique per process and save
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    let sequence = SAVE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), sequence))
}
