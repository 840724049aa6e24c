//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the Wikipedia REST and action
//! APIs and run the full crawl, store and search cycle end-to-end.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use wikidex::config::{
    Config, CrawlerConfig, IndexConfig, OutputConfig, QualityConfig, SeedConfig, SourceConfig,
    UserAgentConfig,
};
use wikidex::run_crawl;
use wikidex::search::{SearchMode, SearchService};
use wikidex::storage::{open_storage, DocumentStore, RunStatus};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUMMARY_PREFIX: &str = "/api/rest_v1/page/summary/";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server_uri: &str, db_path: &Path, seeds: SeedConfig) -> Config {
    let mut crawler = CrawlerConfig::new(2, 50);
    crawler.rate_interval_ms = 1;
    crawler.max_retries = 2;
    crawler.retry_backoff_ms = 5;
    crawler.batch_size = 2;
    crawler.request_timeout_secs = 5;

    Config {
        crawler,
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        source: SourceConfig {
            rest_base_url: format!("{}/api/rest_v1", server_uri),
            action_base_url: format!("{}/w/api.php", server_uri),
        },
        seeds,
        quality: QualityConfig {
            min_word_count: 5,
            min_content_chars: 20,
            min_summary_chars: 10,
            summary_max_chars: 300,
            ..QualityConfig::default()
        },
        index: IndexConfig {
            min_df: 1,
            max_df: 1.0,
            title_boost: 1,
            min_search_score: 0.0,
            min_related_score: 0.0,
            ..IndexConfig::default()
        },
        output: OutputConfig {
            database_path: db_path.to_string_lossy().into_owned(),
        },
    }
}

fn title_seeds(titles: &[&str]) -> SeedConfig {
    SeedConfig {
        titles: titles.iter().map(|t| t.to_string()).collect(),
        ..SeedConfig::default()
    }
}

fn summary_body(title: &str, page_type: &str, extract: &str) -> serde_json::Value {
    json!({
        "type": page_type,
        "title": title,
        "extract": extract,
        "content_urls": {
            "desktop": { "page": format!("https://en.wikipedia.org/wiki/{}", title) }
        }
    })
}

/// Mounts the summary and parse responses of one article
async fn mount_article(server: &MockServer, title: &str, extract: &str, text: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("{}{}", SUMMARY_PREFIX, title)))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body(title, "standard", extract)))
        .mount(server)
        .await;

    let anchors: String = links
        .iter()
        .map(|link| format!(r#" <a href="/wiki/{}">{}</a>"#, link, link))
        .collect();
    let html = format!(
        r#"<div class="mw-parser-output"><p>{}</p><p>See also{}</p></div>"#,
        text, anchors
    );
    let link_entries: Vec<serde_json::Value> = links
        .iter()
        .map(|link| json!({ "ns": 0, "exists": "", "*": link }))
        .collect();

    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("action", "parse"))
        .and(query_param("page", title))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "parse": {
                "title": title,
                "text": { "*": html },
                "links": link_entries
            }
        })))
        .mount(server)
        .await;
}

/// Cat, Dog and Wolf link to each other; Mercury is a disambiguation page
/// and Ghost does not exist
async fn mount_animal_graph(server: &MockServer) {
    mount_article(
        server,
        "Cat",
        "The cat is a small domesticated carnivorous mammal.",
        "The cat is a small domesticated carnivorous mammal known for purring and hunting mice.",
        &["Dog", "Wolf", "Mercury"],
    )
    .await;
    mount_article(
        server,
        "Dog",
        "The dog is a domesticated descendant of the wolf.",
        "The dog is a domesticated descendant of the wolf and a loyal companion to people.",
        &["Cat", "Wolf"],
    )
    .await;
    mount_article(
        server,
        "Wolf",
        "The wolf is a large canine native to Eurasia.",
        "The wolf is a large canine native to Eurasia and North America that hunts in packs.",
        &["Dog", "Ghost"],
    )
    .await;

    Mock::given(method("GET"))
        .and(path(format!("{}Mercury", SUMMARY_PREFIX)))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body(
            "Mercury",
            "disambiguation",
            "Mercury may refer to several things.",
        )))
        .mount(server)
        .await;
}

async fn summary_requests(server: &MockServer, title: &str) -> usize {
    let target = format!("{}{}", SUMMARY_PREFIX, title);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == target)
        .count()
}

#[tokio::test]
async fn test_full_crawl_and_search() {
    let mock_server = MockServer::start().await;
    mount_animal_graph(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wikidex.db");
    let config = create_test_config(&mock_server.uri(), &db_path, title_seeds(&["Cat"]));
    let index_config = config.index.clone();

    let report = run_crawl(config, "test-hash".to_string(), CancellationToken::new())
        .await
        .expect("crawl should succeed");

    assert_eq!(report.accepted, 3);
    assert_eq!(report.persisted, 3);
    assert_eq!(report.skipped, 2, "Mercury and Ghost are skipped");
    assert_eq!(report.rejected, 0);
    assert_eq!(report.unavailable, 0);
    assert_eq!(report.failed_batches, 0);
    assert!(!report.cancelled);

    // each article is fetched exactly once despite the link cycle
    assert_eq!(summary_requests(&mock_server, "Cat").await, 1);
    assert_eq!(summary_requests(&mock_server, "Dog").await, 1);
    assert_eq!(summary_requests(&mock_server, "Wolf").await, 1);

    let store = open_storage(&db_path).unwrap();
    assert_eq!(store.count_documents().unwrap(), 3);

    let cat = store.get_by_id("Cat").unwrap();
    assert_eq!(cat.url, "https://en.wikipedia.org/wiki/Cat");
    assert!(cat.clean_text.contains("purring"));
    assert!(!cat.clean_text.contains('<'));

    let run = store.latest_run().unwrap().expect("run should be recorded");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.persisted, 3);

    let service = SearchService::new(Arc::new(Mutex::new(store)), index_config);
    service.rebuild().await.unwrap();

    let hits = service.search("purring", SearchMode::Vector, 5).await.unwrap();
    assert_eq!(hits[0].title, "Cat");

    let hits = service.search("canine", SearchMode::Lexical, 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Wolf");

    let related = service.related("Dog", 5).await.unwrap();
    assert!(!related.is_empty());
    assert!(related.iter().all(|hit| hit.title != "Dog"));

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.documents, 3);
    assert_eq!(stats.indexed_documents, 3);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}Cat", SUMMARY_PREFIX)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    mount_article(
        &mock_server,
        "Cat",
        "The cat is a small domesticated carnivorous mammal.",
        "The cat is a small domesticated carnivorous mammal known for purring.",
        &[],
    )
    .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wikidex.db");
    let config = create_test_config(&mock_server.uri(), &db_path, title_seeds(&["Cat"]));

    let report = run_crawl(config, "hash".to_string(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.accepted, 1);
    assert_eq!(report.unavailable, 0);
    assert_eq!(summary_requests(&mock_server, "Cat").await, 2);
}

#[tokio::test]
async fn test_exhausted_retries_drop_the_article() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}Cat", SUMMARY_PREFIX)))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wikidex.db");
    let config = create_test_config(&mock_server.uri(), &db_path, title_seeds(&["Cat"]));

    let report = run_crawl(config, "hash".to_string(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.accepted, 0);
    assert_eq!(report.unavailable, 1);
    // one attempt plus two retries
    assert_eq!(summary_requests(&mock_server, "Cat").await, 3);
    assert_eq!(open_storage(&db_path).unwrap().count_documents().unwrap(), 0);
}

#[tokio::test]
async fn test_rerun_skips_stored_articles() {
    let mock_server = MockServer::start().await;
    mount_animal_graph(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wikidex.db");

    let config = create_test_config(&mock_server.uri(), &db_path, title_seeds(&["Cat"]));
    let first = run_crawl(config, "hash".to_string(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.persisted, 3);

    let requests_after_first = mock_server.received_requests().await.unwrap_or_default().len();

    let config = create_test_config(&mock_server.uri(), &db_path, title_seeds(&["Cat", "Dog"]));
    let second = run_crawl(config, "hash".to_string(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.fetched, 0);
    assert_eq!(second.persisted, 0);
    assert_eq!(
        mock_server.received_requests().await.unwrap_or_default().len(),
        requests_after_first
    );

    let store = open_storage(&db_path).unwrap();
    assert_eq!(store.count_documents().unwrap(), 3);
    let run = store.latest_run().unwrap().unwrap();
    assert_eq!(Some(run.id), second.run_id);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_category_seeding() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("list", "categorymembers"))
        .and(query_param("cmtitle", "Category:Felines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": {
                "categorymembers": [
                    { "ns": 0, "title": "Cat" },
                    { "ns": 14, "title": "Category:Big cats" },
                    { "ns": 10, "title": "Template:Felines" }
                ]
            }
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("list", "categorymembers"))
        .and(query_param("cmtitle", "Category:Big cats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": { "categorymembers": [ { "ns": 0, "title": "Lion" } ] }
        })))
        .mount(&mock_server)
        .await;

    mount_article(
        &mock_server,
        "Cat",
        "The cat is a small domesticated carnivorous mammal.",
        "The cat is a small domesticated carnivorous mammal known for purring.",
        &[],
    )
    .await;
    mount_article(
        &mock_server,
        "Lion",
        "The lion is a large cat of the genus Panthera.",
        "The lion is a large cat of the genus Panthera native to Africa and India.",
        &[],
    )
    .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wikidex.db");
    let seeds = SeedConfig {
        categories: vec!["Category:Felines".to_string()],
        ..SeedConfig::default()
    };
    let config = create_test_config(&mock_server.uri(), &db_path, seeds);

    let report = run_crawl(config, "hash".to_string(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.accepted, 2);

    let store = open_storage(&db_path).unwrap();
    assert!(store.get_by_id("Cat").is_ok());
    assert!(store.get_by_id("Lion").is_ok());
    assert_eq!(store.count_documents().unwrap(), 2);
}
