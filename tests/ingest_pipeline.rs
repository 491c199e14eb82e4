//! End-to-end tests for the ingestion pipeline: fetch, classify, parse,
//! dedupe, deliver and record.
//!
//! Feeds are served by a wiremock server and each test opens its own
//! in-memory SQLite registry.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsletter_ingest::feed::{Article, FeedFormat, Fetcher};
use newsletter_ingest::ingest::{poll_all, run_cycle, ArticleSink, IngestRequest, Stage};
use newsletter_ingest::registry::{SqliteRegistry, Subscription};

const RSS_WITH_EMPTY_LINK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <item>
      <guid>no-link</guid>
      <title>Missing link</title>
      <link></link>
    </item>
    <item>
      <guid>x</guid>
      <title>Kept</title>
      <link>https://example.com/x</link>
      <description>&lt;p&gt;Hello&lt;/p&gt;</description>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <category>Tech</category>
      <category>Rust</category>
    </item>
  </channel>
</rss>"#;

const RSS_WITH_MALFORMED_ITEM: &str = r#"<rss version="2.0"><channel>
  <item><guid>1</guid><title>First</title><link>https://example.com/1</link></item>
  <item><guid>2</guid><title>Broken <b>bold</title><link>https://example.com/2</link></item>
  <item><guid>3</guid><title>Third</title><link>https://example.com/3</link></item>
</channel></rss>"#;

const RSS_WITH_UNCLOSED_ITEM: &str = r#"<rss version="2.0"><channel>
  <item><guid>1</guid><title>No link here</title>
  <item><guid>2</guid><link>https://example.com/2</link></item>
  <item><guid>3</guid><link>https://example.com/3</link></item>
</channel></rss>"#;

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <entry>
    <id>urn:uuid:1</id>
    <title>Entry one</title>
    <link rel="self" href="https://example.com/self/1"/>
    <link rel="alternate" href="https://example.com/1"/>
    <updated>2024-01-02T10:00:00Z</updated>
    <content type="html">Body one</content>
  </entry>
  <entry>
    <id>urn:uuid:2</id>
    <title>No link</title>
    <updated>2024-01-03T10:00:00Z</updated>
  </entry>
</feed>"#;

async fn test_registry() -> SqliteRegistry {
    SqliteRegistry::open(":memory:").await.unwrap()
}

async fn serve(route: &str, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

async fn add_subscription(
    registry: &SqliteRegistry,
    id: &str,
    url: String,
    format: FeedFormat,
) -> Subscription {
    let subscription = Subscription {
        id: id.to_string(),
        url,
        format,
        enabled: true,
        discoverable: false,
        created_at: 1_700_000_000,
    };
    registry.create_subscription(&subscription).await.unwrap()
}

fn fetcher() -> Fetcher {
    Fetcher::new(reqwest::Client::new())
}

#[derive(Default)]
struct CollectingSink {
    articles: Mutex<Vec<Article>>,
}

#[async_trait]
impl ArticleSink for CollectingSink {
    async fn deliver(&self, articles: &[Article]) -> anyhow::Result<()> {
        self.articles.lock().unwrap().extend_from_slice(articles);
        Ok(())
    }
}

// ============================================================================
// Single cycle
// ============================================================================

#[tokio::test]
async fn test_empty_link_item_skipped_and_new_item_emitted() {
    let server = serve("/rss", RSS_WITH_EMPTY_LINK).await;
    let registry = test_registry().await;
    let sub = add_subscription(&registry, "s1", format!("{}/rss", server.uri()), FeedFormat::Rss).await;

    let output = run_cycle(&fetcher(), &registry, &IngestRequest::from(&sub))
        .await
        .unwrap();

    assert_eq!(output.skipped, 1);
    assert_eq!(
        output.articles,
        vec![Article {
            subscription_id: "s1".into(),
            guid: "x".into(),
            title: "Kept".into(),
            link: "https://example.com/x".into(),
            description: "<p>Hello</p>".into(),
            published: Some("Tue, 02 Jan 2024 10:00:00 GMT".into()),
            categories: Some("Tech, Rust".into()),
        }]
    );
}

#[tokio::test]
async fn test_already_ingested_guid_filtered_out() {
    let server = serve("/rss", RSS_WITH_EMPTY_LINK).await;
    let registry = test_registry().await;
    let sub = add_subscription(&registry, "s1", format!("{}/rss", server.uri()), FeedFormat::Rss).await;
    registry
        .insert_ingested("s1", &["x".to_string()])
        .await
        .unwrap();

    let output = run_cycle(&fetcher(), &registry, &IngestRequest::from(&sub))
        .await
        .unwrap();

    assert!(output.articles.is_empty());
    assert_eq!(output.parsed, 1);
    assert_eq!(output.skipped, 1);
}

#[tokio::test]
async fn test_malformed_item_does_not_lose_neighbours() {
    let server = serve("/rss", RSS_WITH_MALFORMED_ITEM).await;
    let registry = test_registry().await;
    let sub = add_subscription(&registry, "s1", format!("{}/rss", server.uri()), FeedFormat::Rss).await;

    let output = run_cycle(&fetcher(), &registry, &IngestRequest::from(&sub))
        .await
        .unwrap();

    let pairs: Vec<(&str, &str)> = output
        .articles
        .iter()
        .map(|a| (a.guid.as_str(), a.link.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("1", "https://example.com/1"),
            ("2", "https://example.com/2"),
            ("3", "https://example.com/3"),
        ]
    );
    assert_eq!(output.articles[1].title, "Broken");
    assert_eq!(output.skipped, 0);
}

#[tokio::test]
async fn test_unclosed_item_is_dropped_not_merged() {
    let server = serve("/rss", RSS_WITH_UNCLOSED_ITEM).await;
    let registry = test_registry().await;
    let sub = add_subscription(&registry, "s1", format!("{}/rss", server.uri()), FeedFormat::Rss).await;

    let output = run_cycle(&fetcher(), &registry, &IngestRequest::from(&sub))
        .await
        .unwrap();

    let links: Vec<&str> = output.articles.iter().map(|a| a.link.as_str()).collect();
    assert_eq!(links, vec!["https://example.com/2", "https://example.com/3"]);
    assert_eq!(output.skipped, 1);
}

#[tokio::test]
async fn test_atom_cycle() {
    let server = serve("/atom", ATOM).await;
    let registry = test_registry().await;
    let sub = add_subscription(&registry, "a1", format!("{}/atom", server.uri()), FeedFormat::Atom).await;

    let output = run_cycle(&fetcher(), &registry, &IngestRequest::from(&sub))
        .await
        .unwrap();

    assert_eq!(output.skipped, 1);
    assert_eq!(output.articles.len(), 1);
    let article = &output.articles[0];
    assert_eq!(article.guid, "urn:uuid:1");
    assert_eq!(article.link, "https://example.com/1");
    assert_eq!(article.description, "Body one");
    assert_eq!(article.published.as_deref(), Some("2024-01-02T10:00:00Z"));
    assert_eq!(article.categories, None);
}

#[tokio::test]
async fn test_non_feed_response_fails_at_classification() {
    let server = serve("/page", "<html><body>hello</body></html>").await;
    let registry = test_registry().await;
    let sub = add_subscription(&registry, "s1", format!("{}/page", server.uri()), FeedFormat::Rss).await;

    let err = run_cycle(&fetcher(), &registry, &IngestRequest::from(&sub))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Classifying);
    assert!(!err.is_retryable());
}

// ============================================================================
// Poll: deliver then record
// ============================================================================

#[tokio::test]
async fn test_poll_records_markers_so_next_poll_is_empty() {
    let server = serve("/rss", RSS_WITH_EMPTY_LINK).await;
    let registry = test_registry().await;
    add_subscription(&registry, "s1", format!("{}/rss", server.uri()), FeedFormat::Rss).await;

    let shared = Arc::new(registry.clone());
    let sink = Arc::new(CollectingSink::default());

    let first = poll_all(shared.clone(), fetcher(), sink.clone(), 4).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].result.as_ref().ok(), Some(&1));

    let recorded = registry.load_ingested_guids("s1").await.unwrap();
    assert!(recorded.contains("x"));
    assert_eq!(recorded.len(), 1);

    let second = poll_all(shared, fetcher(), sink.clone(), 4).await.unwrap();
    assert_eq!(second[0].result.as_ref().ok(), Some(&0));
    assert_eq!(sink.articles.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_poll_skips_disabled_subscription() {
    let server = serve("/rss", RSS_WITH_EMPTY_LINK).await;
    let registry = test_registry().await;
    add_subscription(&registry, "s1", format!("{}/rss", server.uri()), FeedFormat::Rss).await;
    registry.set_enabled("s1", false).await.unwrap();

    let sink = Arc::new(CollectingSink::default());
    let reports = poll_all(Arc::new(registry.clone()), fetcher(), sink.clone(), 4)
        .await
        .unwrap();

    assert!(reports.is_empty());
    assert!(sink.articles.lock().unwrap().is_empty());
    assert!(registry.load_ingested_guids("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_poll_many_subscriptions_concurrently() {
    let server = serve("/rss", RSS_WITH_EMPTY_LINK).await;
    let registry = test_registry().await;
    for n in 0..6 {
        // Distinct URLs for the unique constraint; the query string is ignored by the mock
        add_subscription(
            &registry,
            &format!("s{n}"),
            format!("{}/rss?n={n}", server.uri()),
            FeedFormat::Rss,
        )
        .await;
    }

    let sink = Arc::new(CollectingSink::default());
    let reports = poll_all(Arc::new(registry.clone()), fetcher(), sink.clone(), 2)
        .await
        .unwrap();

    assert_eq!(reports.len(), 6);
    assert!(reports.iter().all(|r| r.result.as_ref().ok() == Some(&1)));
    assert_eq!(sink.articles.lock().unwrap().len(), 6);
    for n in 0..6 {
        let recorded = registry.load_ingested_guids(&format!("s{n}")).await.unwrap();
        assert!(recorded.contains("x"));
    }
}
