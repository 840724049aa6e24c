//! TF-IDF vector indexer
//!
//! Builds a [`TermDocumentMatrix`] from a snapshot of stored documents.
//! Every intermediate map is ordered, so the same snapshot and configuration
//! always produce the same matrix regardless of the order documents arrive in.

use crate::config::IndexConfig;
use crate::index::matrix::{SparseRow, TermDocumentMatrix, Vocabulary};
use crate::index::tokenizer::Tokenizer;
use crate::storage::Document;
use std::collections::BTreeMap;

/// Smoothed inverse document frequency
///
/// `ln((1 + n) / (1 + df)) + 1`, so a term present in every document still
/// keeps a positive weight.
pub fn smoothed_idf(documents: usize, df: usize) -> f64 {
    ((1.0 + documents as f64) / (1.0 + df as f64)).ln() + 1.0
}

/// Text indexed for a document: the boosted title, the summary, then the body
fn index_text(document: &Document, title_boost: usize) -> String {
    let mut text = String::with_capacity(
        (document.title.len() + 1) * title_boost + document.summary.len() + document.clean_text.len() + 1,
    );
    for _ in 0..title_boost {
        text.push_str(&document.title);
        text.push(' ');
    }
    text.push_str(&document.summary);
    text.push(' ');
    text.push_str(&document.clean_text);
    text
}

/// Builds the term-document matrix for a document snapshot
///
/// # Steps
///
/// 1. Order documents by title and drop repeated titles
/// 2. Count n-gram terms per document
/// 3. Keep terms with `min_df <= df <= max_df * N`
/// 4. If more than `max_features` remain, keep those with the highest
///    aggregate tf-idf weight (ties go to the lexicographically smaller term)
/// 5. Weight each document's terms by tf-idf and L2-normalize the row
pub fn build_index(documents: &[Document], config: &IndexConfig) -> TermDocumentMatrix {
    let tokenizer = Tokenizer::from_config(config);

    let mut ordered: Vec<&Document> = documents.iter().collect();
    ordered.sort_by(|a, b| a.title.cmp(&b.title));
    ordered.dedup_by(|a, b| a.title == b.title);

    let term_counts: Vec<BTreeMap<String, u32>> = ordered
        .iter()
        .map(|document| {
            let mut counts = BTreeMap::new();
            for term in tokenizer.terms(&index_text(document, config.title_boost)) {
                *counts.entry(term).or_insert(0) += 1;
            }
            counts
        })
        .collect();

    let n_docs = ordered.len();
    let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for counts in &term_counts {
        for term in counts.keys() {
            *document_frequency.entry(term.as_str()).or_insert(0) += 1;
        }
    }

    let max_df = config.max_df * n_docs as f64;
    let mut kept: BTreeMap<&str, f64> = document_frequency
        .into_iter()
        .filter(|&(_, df)| df >= config.min_df && df as f64 <= max_df)
        .map(|(term, df)| (term, smoothed_idf(n_docs, df)))
        .collect();

    if kept.len() > config.max_features {
        kept = cap_vocabulary(kept, &term_counts, config.max_features);
    }

    let terms: Vec<String> = kept.keys().map(|term| term.to_string()).collect();
    let idf: Vec<f64> = kept.values().copied().collect();
    let columns: BTreeMap<&str, u32> = kept
        .keys()
        .enumerate()
        .map(|(column, term)| (*term, column as u32))
        .collect();

    let mut corpus_weight = vec![0.0; terms.len()];
    let rows: Vec<SparseRow> = term_counts
        .iter()
        .map(|counts| {
            let entries = counts
                .iter()
                .filter_map(|(term, &tf)| {
                    columns
                        .get(term.as_str())
                        .map(|&column| (column, f64::from(tf) * idf[column as usize]))
                })
                .collect();
            let row = SparseRow::normalized(entries);
            for (&column, &value) in row.columns.iter().zip(&row.values) {
                corpus_weight[column as usize] += value;
            }
            row
        })
        .collect();

    let doc_ids = ordered.iter().map(|d| d.title.clone()).collect();

    tracing::debug!(
        "Built index over {} documents with {} terms",
        n_docs,
        terms.len()
    );

    TermDocumentMatrix::new(
        Vocabulary::new(terms, idf, corpus_weight),
        doc_ids,
        rows,
        tokenizer,
    )
}

/// Keeps the `max_features` terms with the highest summed tf-idf weight
fn cap_vocabulary<'a>(
    kept: BTreeMap<&'a str, f64>,
    term_counts: &[BTreeMap<String, u32>],
    max_features: usize,
) -> BTreeMap<&'a str, f64> {
    let mut aggregate: BTreeMap<&str, f64> = BTreeMap::new();
    for counts in term_counts {
        for (term, &tf) in counts {
            if let Some(&idf) = kept.get(term.as_str()) {
                *aggregate.entry(term.as_str()).or_insert(0.0) += f64::from(tf) * idf;
            }
        }
    }

    let mut ranked: Vec<(&str, f64)> = aggregate.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(max_features);

    ranked
        .into_iter()
        .filter_map(|(term, _)| kept.get_key_value(term).map(|(&k, &v)| (k, v)))
        .collect()
}
