//! Article normalization and quality filtering
//!
//! This module turns a raw article into a [`Document`]:
//! - Strips markup, navigation boxes, tables and reference markers
//! - Collapses whitespace and removes control characters
//! - Derives a summary when the source supplied none
//! - Rejects articles that fail the quality thresholds

use crate::config::QualityConfig;
use crate::crawler::source::{is_excluded_namespace, RawArticle};
use crate::storage::Document;
use chrono::Utc;
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;

/// Elements whose text never belongs to the article body
const SKIPPED_TAGS: &[&str] = &["script", "style", "table", "noscript", "math", "figure"];

/// Classes marking boilerplate blocks
const SKIPPED_CLASSES: &[&str] = &[
    "navbox",
    "infobox",
    "reference",
    "reflist",
    "mw-references-wrap",
    "mw-editsection",
    "hatnote",
    "thumb",
];

/// Elements followed by a word break
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "dl", "dt", "dd", "br", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "section", "pre",
];

/// Why an article was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    LowQuality,
}

/// A rejected article
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {detail}")]
pub struct RejectReason {
    pub kind: RejectKind,
    pub detail: String,
}

impl RejectReason {
    fn low_quality(detail: impl Into<String>) -> Self {
        Self {
            kind: RejectKind::LowQuality,
            detail: detail.into(),
        }
    }
}

/// Normalizes raw articles against a fixed quality policy
///
/// Normalization depends only on its input and the policy, so one
/// instance is shared by every worker.
#[derive(Debug)]
pub struct Normalizer {
    policy: QualityConfig,
    skip: Option<Regex>,
    references: Regex,
    whitespace: Regex,
}

impl Normalizer {
    /// Compiles the quality policy
    ///
    /// # Errors
    ///
    /// Returns an error if the combined skip-pattern expression is too
    /// large to compile.
    pub fn new(policy: QualityConfig) -> Result<Self, regex::Error> {
        let skip = if policy.skip_patterns.is_empty() {
            None
        } else {
            let alternation = policy
                .skip_patterns
                .iter()
                .map(|pattern| regex::escape(pattern))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                RegexBuilder::new(&alternation)
                    .case_insensitive(true)
                    .build()?,
            )
        };

        Ok(Self {
            policy,
            skip,
            references: Regex::new(r"\[(?:\d+|[a-z]|citation needed|note \d+|edit)\]")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Normalizes one article
    ///
    /// # Quality Checks
    ///
    /// Applied in order, the first failure rejects the article:
    ///
    /// 1. Title or summary matches a skip pattern
    /// 2. Raw markup shorter than `min_content_chars`
    /// 3. Summary shorter than `min_summary_chars`
    /// 4. Clean text has fewer than `min_word_count` words
    pub fn normalize(&self, raw: &RawArticle) -> Result<Document, RejectReason> {
        let title = raw.title.trim();
        if title.is_empty() {
            return Err(RejectReason::low_quality("empty title"));
        }

        if let Some(skip) = &self.skip {
            if let Some(found) = skip.find(title).or_else(|| skip.find(&raw.summary)) {
                return Err(RejectReason::low_quality(format!(
                    "matches skip pattern '{}'",
                    found.as_str()
                )));
            }
        }

        let content_chars = raw.html.chars().count();
        if content_chars < self.policy.min_content_chars {
            return Err(RejectReason::low_quality(format!(
                "content too short ({} < {} chars)",
                content_chars, self.policy.min_content_chars
            )));
        }

        let clean_text = self.clean_text(&raw.html);

        let summary = match self.clean_fragment(&raw.summary) {
            s if s.is_empty() => truncate_on_word(&clean_text, self.policy.summary_max_chars),
            s => s,
        };

        let summary_chars = summary.chars().count();
        if summary_chars < self.policy.min_summary_chars {
            return Err(RejectReason::low_quality(format!(
                "summary too short ({} < {} chars)",
                summary_chars, self.policy.min_summary_chars
            )));
        }

        let word_count = clean_text.split_whitespace().count();
        if word_count < self.policy.min_word_count {
            return Err(RejectReason::low_quality(format!(
                "too few words ({} < {})",
                word_count, self.policy.min_word_count
            )));
        }

        Ok(Document {
            title: title.to_string(),
            content: raw.html.clone(),
            clean_text,
            summary,
            word_count,
            url: raw.url.clone(),
            created_at: Utc::now(),
        })
    }

    /// Extracts readable text from article markup
    pub fn clean_text(&self, html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let mut text = String::with_capacity(html.len() / 2);
        collect_text(fragment.root_element(), &mut text);
        self.clean_fragment(&text)
    }

    fn clean_fragment(&self, text: &str) -> String {
        let without_controls: String = text
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let without_refs = self.references.replace_all(&without_controls, "");
        self.whitespace
            .replace_all(&without_refs, " ")
            .trim()
            .to_string()
    }
}

/// Appends the text of `element` and its descendants, skipping boilerplate
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    if is_boilerplate(&child_element) {
                        continue;
                    }
                    collect_text(child_element, out);
                    if BLOCK_TAGS.contains(&child_element.value().name()) {
                        out.push(' ');
                    }
                }
            }
            _ => {}
        }
    }
}

fn is_boilerplate(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if SKIPPED_TAGS.contains(&value.name()) {
        return true;
    }
    value
        .classes()
        .any(|class| SKIPPED_CLASSES.contains(&class))
}

/// Cuts `text` to at most `max_chars` characters, ending on a word boundary
fn truncate_on_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..cut];

    match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => head[..space].trim_end().to_string(),
        _ => head.to_string(),
    }
}

/// Titles of articles an article links to
///
/// Uses the links reported by the source and falls back to `/wiki/`
/// anchors in the markup. Namespaced pages and self links are dropped,
/// and the order of first appearance is kept.
pub fn outbound_links(raw: &RawArticle) -> Vec<String> {
    let candidates = if raw.links.is_empty() {
        extract_wiki_links(&raw.html)
    } else {
        raw.links.clone()
    };

    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty() && title != &raw.title && !is_excluded_namespace(title))
        .filter(|title| seen.insert(title.clone()))
        .collect()
}

/// Extracts article titles from `/wiki/` anchors
///
/// # Example
///
/// ```
/// use wikidex::crawler::extract_wiki_links;
///
/// let html = r#"<p>See <a href="/wiki/Graph_theory#Intro">graphs</a>.</p>"#;
/// assert_eq!(extract_wiki_links(html), vec!["Graph theory".to_string()]);
/// ```
pub fn extract_wiki_links(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in fragment.select(&selector) {
            if let Some(title) = element.value().attr("href").and_then(wiki_title) {
                links.push(title);
            }
        }
    }

    links
}

/// Converts a `/wiki/Some_Title#anchor` href into `Some Title`
fn wiki_title(href: &str) -> Option<String> {
    let path = href.trim().strip_prefix("/wiki/")?;
    let path = path.split(['#', '?']).next()?;
    if path.is_empty() {
        return None;
    }

    Some(percent_decode(path).replace('_', " "))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
