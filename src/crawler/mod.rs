//! Crawler module for article fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Article retrieval from the Wikipedia APIs
//! - Rate limiting and retry logic shared by all workers
//! - The deduplicating work frontier
//! - Markup cleaning and quality filtering
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod gate;
mod normalizer;
mod source;

pub use coordinator::{run_crawl, CrawlReport, Crawler};
pub use fetcher::{FetchError, FetchErrorKind, Fetcher, RetryPolicy};
pub use frontier::{Frontier, FrontierEntry};
pub use gate::RateGate;
pub use normalizer::{extract_wiki_links, outbound_links, Normalizer, RejectKind, RejectReason};
pub use source::{
    build_http_client, is_excluded_namespace, ArticleSource, Attempt, CategoryMember, RawArticle,
    SkipReason, WikipediaClient, ARTICLE_NAMESPACE, CATEGORY_NAMESPACE,
};
