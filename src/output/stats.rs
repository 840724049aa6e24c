//! Statistics and result formatting
//!
//! Each report has a `format_*` function producing the text and a
//! `print_*` wrapper writing it to stdout.

use crate::crawler::CrawlReport;
use crate::search::{IndexStats, SearchHit};
use crate::storage::Document;

/// Longest summary excerpt shown per hit
const EXCERPT_CHARS: usize = 160;

/// Formats the totals of a finished crawl
pub fn format_crawl_report(report: &CrawlReport) -> String {
    let mut out = String::new();

    out.push_str("=== Crawl Statistics ===\n\n");
    if let Some(run_id) = report.run_id {
        out.push_str(&format!("Run: #{}\n", run_id));
    }
    out.push_str(&format!(
        "Status: {}\n",
        if report.cancelled { "interrupted" } else { "completed" }
    ));
    out.push_str(&format!(
        "Elapsed: {:.1}s ({:.2} articles/s)\n\n",
        report.elapsed.as_secs_f64(),
        report.rate()
    ));

    out.push_str("Articles:\n");
    out.push_str(&format!("  Fetched: {}\n", report.fetched));
    out.push_str(&format!("  Accepted: {}\n", report.accepted));
    out.push_str(&format!("  Persisted: {}\n", report.persisted));
    out.push_str(&format!("  Duplicates: {}\n", report.duplicates));
    out.push_str(&format!("  Rejected (low quality): {}\n", report.rejected));
    out.push_str(&format!("  Skipped: {}\n", report.skipped));
    out.push_str(&format!("  Unavailable: {}\n\n", report.unavailable));

    out.push_str("Frontier:\n");
    out.push_str(&format!("  Links discovered: {}\n", report.discovered));
    out.push_str(&format!("  Left in queue: {}\n", report.pending));

    if report.failed_batches > 0 {
        out.push_str(&format!(
            "\nFailed batches: {} ({} documents lost)\n",
            report.failed_batches, report.lost_documents
        ));
    }

    let attempted = report.fetched + report.skipped + report.unavailable;
    let acceptance = if attempted > 0 {
        (report.accepted as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };
    out.push_str(&format!(
        "\nAcceptance Rate: {:.1}% ({} / {} identifiers accepted)\n",
        acceptance, report.accepted, attempted
    ));

    out
}

/// Prints the totals of a finished crawl to stdout
pub fn print_crawl_report(report: &CrawlReport) {
    print!("{}", format_crawl_report(report));
}

/// Formats corpus and index statistics
pub fn format_index_stats(stats: &IndexStats) -> String {
    let mut out = String::new();

    out.push_str("=== Index Statistics ===\n\n");
    out.push_str("Corpus:\n");
    out.push_str(&format!("  Stored documents: {}\n", stats.documents));
    if let Some(words) = &stats.word_counts {
        out.push_str(&format!("  Average words: {:.2}\n", words.average));
        out.push_str(&format!("  Word range: {} to {}\n", words.min, words.max));
    }
    if let Some(run) = &stats.last_run {
        out.push_str(&format!(
            "  Last crawl: #{} {} ({}, {} accepted, {} persisted)\n",
            run.id,
            run.started_at,
            run.status.to_db_string(),
            run.accepted,
            run.persisted
        ));
    }

    out.push_str("\nIndex:\n");
    match stats.generation {
        Some(generation) => {
            out.push_str(&format!("  Generation: {}\n", generation));
            if let Some(built_at) = stats.last_rebuild {
                out.push_str(&format!("  Built: {}\n", built_at.to_rfc3339()));
            }
            out.push_str(&format!("  Indexed documents: {}\n", stats.indexed_documents));
            out.push_str(&format!("  Vocabulary: {} terms\n", stats.vocabulary_size));
            out.push_str(&format!(
                "  Non-zeros: {} (density {:.4}%)\n",
                stats.nnz,
                stats.density * 100.0
            ));
            if !stats.sample_terms.is_empty() {
                out.push_str(&format!("  Top terms: {}\n", stats.sample_terms.join(", ")));
            }
        }
        None => out.push_str("  Not built\n"),
    }

    out
}

/// Prints corpus and index statistics to stdout
pub fn print_index_stats(stats: &IndexStats) {
    print!("{}", format_index_stats(stats));
}

/// Formats ranked hits, one numbered block per hit
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = String::new();
    for (rank, hit) in hits.iter().enumerate() {
        out.push_str(&format!("{:>2}. {} ({:.4})\n", rank + 1, hit.title, hit.score));
        out.push_str(&format!("    {}\n", hit.url));
        if !hit.summary.is_empty() {
            out.push_str(&format!("    {}\n", excerpt(&hit.summary)));
        }
    }
    out
}

/// Prints ranked hits to stdout
pub fn print_hits(hits: &[SearchHit]) {
    print!("{}", format_hits(hits));
}

/// Formats recently stored documents with their storage time
pub fn format_recent(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No documents stored.\n".to_string();
    }

    let mut out = String::new();
    for document in documents {
        out.push_str(&format!(
            "{}  {} ({} words)\n",
            document.created_at.format("%Y-%m-%d %H:%M:%S"),
            document.title,
            document.word_count
        ));
        if !document.summary.is_empty() {
            out.push_str(&format!("    {}\n", excerpt(&document.summary)));
        }
    }
    out
}

/// Prints recently stored documents to stdout
pub fn print_recent(documents: &[Document]) {
    print!("{}", format_recent(documents));
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    match cut.rfind(' ') {
        Some(space) => format!("{}...", &cut[..space]),
        None => format!("{}...", cut),
    }
}
