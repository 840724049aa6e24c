//! Article source abstraction and the Wikipedia HTTP client
//!
//! A source performs exactly one attempt per call and classifies the outcome
//! as fetched, retryable or fatal. Retrying is the fetcher's job. Every HTTP
//! request the client sends first takes a slot from the shared [`RateGate`].

use crate::config::{SourceConfig, UserAgentConfig};
use crate::crawler::gate::RateGate;
use crate::WikidexError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Namespace of regular articles
pub const ARTICLE_NAMESPACE: i64 = 0;

/// Namespace of categories
pub const CATEGORY_NAMESPACE: i64 = 14;

/// Title prefixes of pages that are never articles
const EXCLUDED_NAMESPACES: &[&str] = &[
    "Category:",
    "Template:",
    "File:",
    "Portal:",
    "Help:",
    "Wikipedia:",
    "Talk:",
    "Special:",
    "User:",
    "Draft:",
];

/// Outcome of a single attempt against the source
#[derive(Debug)]
pub enum Attempt<T> {
    /// The request succeeded
    Fetched(T),

    /// A transient failure; trying again may succeed
    Retryable(String),

    /// A permanent condition; trying again is pointless
    Fatal(SkipReason),
}

/// Why an identifier will never produce an article
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Disambiguation,
    ExcludedNamespace,
    Other(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Disambiguation => write!(f, "disambiguation page"),
            Self::ExcludedNamespace => write!(f, "excluded namespace"),
            Self::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Raw article as delivered by the source
#[derive(Debug, Clone, Default)]
pub struct RawArticle {
    /// Canonical title (may differ from the requested one after redirects)
    pub title: String,
    /// Plain-text lead summary, possibly empty
    pub summary: String,
    /// Rendered article markup
    pub html: String,
    /// Canonical page URL
    pub url: String,
    /// Titles of linked articles
    pub links: Vec<String>,
}

/// A page listed under a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMember {
    pub title: String,
    pub ns: i64,
}

/// Anything articles can be fetched from
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Makes one attempt at retrieving an article
    async fn attempt(&self, title: &str) -> Attempt<RawArticle>;

    /// Makes one attempt at listing up to `limit` members of a category
    async fn category_members(&self, category: &str, limit: usize) -> Attempt<Vec<CategoryMember>> {
        let _ = (category, limit);
        Attempt::Fetched(Vec::new())
    }
}

/// Returns true for titles outside the article namespace
pub fn is_excluded_namespace(title: &str) -> bool {
    EXCLUDED_NAMESPACES
        .iter()
        .any(|prefix| title.starts_with(prefix))
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use wikidex::config::UserAgentConfig;
/// use wikidex::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "Wikidex".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(rename = "type", default)]
    page_type: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParseBody>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    #[serde(default)]
    title: String,
    text: Option<ParseText>,
    #[serde(default)]
    links: Vec<ParseLink>,
}

#[derive(Debug, Deserialize)]
struct ParseText {
    #[serde(rename = "*")]
    html: String,
}

#[derive(Debug, Deserialize)]
struct ParseLink {
    ns: i64,
    #[serde(rename = "*")]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct CategoryResponse {
    query: Option<CategoryQuery>,
    #[serde(rename = "continue")]
    continuation: Option<CategoryContinue>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    #[serde(default)]
    categorymembers: Vec<CategoryMemberEntry>,
}

#[derive(Debug, Deserialize)]
struct CategoryMemberEntry {
    ns: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct CategoryContinue {
    cmcontinue: Option<String>,
}

/// Maps an action API error code onto an attempt outcome
fn classify_api_error<T>(error: ApiError) -> Attempt<T> {
    match error.code.as_str() {
        "missingtitle" | "invalidtitle" | "nosuchpageid" => Attempt::Fatal(SkipReason::NotFound),
        "ratelimited" | "maxlag" | "readonly" => {
            Attempt::Retryable(format!("{}: {}", error.code, error.info))
        }
        _ => Attempt::Fatal(SkipReason::Other(format!("{}: {}", error.code, error.info))),
    }
}

/// Client for the Wikipedia REST and action APIs
pub struct WikipediaClient {
    client: Client,
    rest_base: Url,
    action_base: Url,
    gate: Arc<RateGate>,
}

impl WikipediaClient {
    /// Creates a client for the configured endpoints, paced by `gate`
    pub fn new(
        source: &SourceConfig,
        user_agent: &UserAgentConfig,
        timeout: Duration,
        gate: Arc<RateGate>,
    ) -> Result<Self, WikidexError> {
        let client = build_http_client(user_agent, timeout)?;
        let rest_base = Url::parse(&source.rest_base_url)
            .map_err(|e| WikidexError::Fatal(format!("invalid rest base url: {}", e)))?;
        let action_base = Url::parse(&source.action_base_url)
            .map_err(|e| WikidexError::Fatal(format!("invalid action base url: {}", e)))?;

        Ok(Self {
            client,
            rest_base,
            action_base,
            gate,
        })
    }

    fn summary_url(&self, title: &str) -> Option<Url> {
        let mut url = self.rest_base.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push("page")
            .push("summary")
            .push(&title.replace(' ', "_"));
        Some(url)
    }

    fn parse_url(&self, title: &str) -> Url {
        let mut url = self.action_base.clone();
        url.query_pairs_mut()
            .append_pair("action", "parse")
            .append_pair("page", title)
            .append_pair("prop", "text|links")
            .append_pair("redirects", "1")
            .append_pair("format", "json");
        url
    }

    fn category_url(&self, category: &str, batch: usize, continuation: Option<&str>) -> Url {
        let mut url = self.action_base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("action", "query")
                .append_pair("list", "categorymembers")
                .append_pair("cmtitle", category)
                .append_pair("cmlimit", &batch.to_string())
                .append_pair("format", "json");
            if let Some(token) = continuation {
                pairs.append_pair("cmcontinue", token);
            }
        }
        url
    }

    /// Issues a GET and decodes the JSON body, classifying every failure
    ///
    /// | Condition | Outcome |
    /// |-----------|---------|
    /// | HTTP 404 | Fatal(NotFound) |
    /// | HTTP 429, 5xx | Retryable |
    /// | Other non-2xx | Fatal |
    /// | Timeout, connection failure | Retryable |
    /// | Undecodable body | Fatal |
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Attempt<T> {
        self.gate.wait().await;

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Attempt::Retryable("request timeout".to_string()),
            Err(e) if e.is_connect() => {
                return Attempt::Retryable(format!("connection failed: {}", e))
            }
            Err(e) => return Attempt::Fatal(SkipReason::Other(e.to_string())),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Attempt::Fatal(SkipReason::NotFound);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Attempt::Retryable(format!("HTTP {}", status.as_u16()));
        }
        if !status.is_success() {
            return Attempt::Fatal(SkipReason::Other(format!("HTTP {}", status.as_u16())));
        }

        match response.json::<T>().await {
            Ok(body) => Attempt::Fetched(body),
            Err(e) if e.is_timeout() => Attempt::Retryable("body timeout".to_string()),
            Err(e) => Attempt::Fatal(SkipReason::Other(format!("invalid response: {}", e))),
        }
    }
}

#[async_trait]
impl ArticleSource for WikipediaClient {
    async fn attempt(&self, title: &str) -> Attempt<RawArticle> {
        if is_excluded_namespace(title) {
            return Attempt::Fatal(SkipReason::ExcludedNamespace);
        }

        let summary_url = match self.summary_url(title) {
            Some(url) => url,
            None => return Attempt::Fatal(SkipReason::Other("unusable rest base url".to_string())),
        };

        let summary: SummaryResponse = match self.get_json(summary_url).await {
            Attempt::Fetched(s) => s,
            Attempt::Retryable(reason) => return Attempt::Retryable(reason),
            Attempt::Fatal(reason) => return Attempt::Fatal(reason),
        };

        if summary.page_type == "disambiguation" {
            return Attempt::Fatal(SkipReason::Disambiguation);
        }

        let parsed: ParseResponse = match self.get_json(self.parse_url(title)).await {
            Attempt::Fetched(p) => p,
            Attempt::Retryable(reason) => return Attempt::Retryable(reason),
            Attempt::Fatal(reason) => return Attempt::Fatal(reason),
        };

        if let Some(error) = parsed.error {
            return classify_api_error(error);
        }

        let body = match parsed.parse {
            Some(body) => body,
            None => return Attempt::Fatal(SkipReason::Other("empty parse response".to_string())),
        };

        let canonical = if !summary.title.is_empty() {
            summary.title
        } else if !body.title.is_empty() {
            body.title
        } else {
            title.to_string()
        };

        let url = summary
            .content_urls
            .and_then(|urls| urls.desktop)
            .map(|desktop| desktop.page)
            .unwrap_or_default();

        let links = body
            .links
            .into_iter()
            .filter(|link| link.ns == ARTICLE_NAMESPACE)
            .map(|link| link.title)
            .collect();

        Attempt::Fetched(RawArticle {
            title: canonical,
            summary: summary.extract,
            html: body.text.map(|t| t.html).unwrap_or_default(),
            url,
            links,
        })
    }

    async fn category_members(&self, category: &str, limit: usize) -> Attempt<Vec<CategoryMember>> {
        let mut members = Vec::new();
        let mut continuation: Option<String> = None;

        while members.len() < limit {
            let batch = (limit - members.len()).min(500);
            let url = self.category_url(category, batch, continuation.as_deref());

            let page: CategoryResponse = match self.get_json(url).await {
                Attempt::Fetched(p) => p,
                Attempt::Retryable(reason) => return Attempt::Retryable(reason),
                Attempt::Fatal(reason) => return Attempt::Fatal(reason),
            };

            if let Some(error) = page.error {
                return classify_api_error(error);
            }

            let entries = page.query.map(|q| q.categorymembers).unwrap_or_default();
            if entries.is_empty() {
                break;
            }
            members.extend(entries.into_iter().map(|entry| CategoryMember {
                title: entry.title,
                ns: entry.ns,
            }));

            continuation = page.continuation.and_then(|c| c.cmcontinue);
            if continuation.is_none() {
                break;
            }
        }

        members.truncate(limit);
        Attempt::Fetched(members)
    }
}
