//! Retrying fetcher
//!
//! This module wraps an [`ArticleSource`] with:
//! - Bounded retries with doubling backoff for transient failures
//! - Error classification into skip (permanent) and unavailable (exhausted)
//!
//! Pacing happens below this layer: the source takes a [`RateGate`] slot
//! for every request it sends.
//!
//! [`RateGate`]: crate::crawler::RateGate

use crate::config::CrawlerConfig;
use crate::crawler::source::{ArticleSource, Attempt, CategoryMember, RawArticle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Largest exponent applied to the retry backoff
const MAX_BACKOFF_SHIFT: u32 = 16;

/// How a fetch ended when no content was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Transient failures persisted through every retry
    Unavailable,
    /// The identifier can never produce content
    Skip,
}

/// A failed fetch
#[derive(Debug, Clone, Error)]
#[error("{kind:?} fetching '{title}': {reason}")]
pub struct FetchError {
    pub title: String,
    pub kind: FetchErrorKind,
    pub reason: String,
}

/// Retry limits for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each subsequent one
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based)
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << retry.min(MAX_BACKOFF_SHIFT))
    }
}

impl From<&CrawlerConfig> for RetryPolicy {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Fetches articles with bounded retries
pub struct Fetcher {
    source: Arc<dyn ArticleSource>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(source: Arc<dyn ArticleSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Creates a fetcher bounded by the crawler's retry settings
    pub fn from_config(source: Arc<dyn ArticleSource>, config: &CrawlerConfig) -> Self {
        Self::new(source, RetryPolicy::from(config))
    }

    /// Fetches one article
    ///
    /// # Retry Logic
    ///
    /// | Outcome | Action |
    /// |---------|--------|
    /// | Fetched | Return immediately |
    /// | Fatal | Skip, no retry |
    /// | Retryable | Back off and retry, Unavailable once retries run out |
    pub async fn fetch(&self, title: &str) -> Result<RawArticle, FetchError> {
        self.with_retries(title, || self.source.attempt(title)).await
    }

    /// Lists category members with the same pacing and retry rules
    pub async fn category_members(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<CategoryMember>, FetchError> {
        self.with_retries(category, || self.source.category_members(category, limit))
            .await
    }

    async fn with_retries<T, F, Fut>(&self, title: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Attempt::Fetched(value) => return Ok(value),
                Attempt::Fatal(reason) => {
                    return Err(FetchError {
                        title: title.to_string(),
                        kind: FetchErrorKind::Skip,
                        reason: reason.to_string(),
                    })
                }
                Attempt::Retryable(reason) => {
                    if retry >= self.policy.max_retries {
                        return Err(FetchError {
                            title: title.to_string(),
                            kind: FetchErrorKind::Unavailable,
                            reason: format!("{} (after {} attempts)", reason, retry + 1),
                        });
                    }

                    let delay = self.policy.delay(retry);
                    tracing::debug!(
                        "Retrying '{}' in {:?} after: {}",
                        title,
                        delay,
                        reason
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}
