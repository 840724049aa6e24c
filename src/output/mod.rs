//! Console rendering of crawl and query results
//!
//! This module handles:
//! - End-of-run crawl statistics
//! - Corpus and index statistics
//! - Ranked search hits
//! - Recently stored documents

pub mod stats;

pub use stats::{
    format_crawl_report, format_hits, format_index_stats, format_recent, print_crawl_report,
    print_hits, print_index_stats, print_recent,
};
