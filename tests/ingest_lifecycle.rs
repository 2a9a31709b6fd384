//! Integration tests for the ingestion cycle: select, fetch, store.
//!
//! Each test gets its own in-memory SQLite database and wiremock server.

use chrono::Utc;
use gator::aggregator::{next_feed, scrape_feed, IngestError, Poller, UNTITLED};
use gator::feed::{FeedClient, FeedError, FetchError};
use gator::storage::{Database, Feed};
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TWO_ITEM_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
    <title>Lane's Blog</title>
    <link>https://wagslane.dev/</link>
    <item>
        <title>The Zen of Proverbs</title>
        <link>https://wagslane.dev/posts/zen-of-proverbs/</link>
        <pubDate>Sun, 19 Mar 2023 00:00:00 +0000</pubDate>
        <description>20 rules of thumb for writing better software.</description>
    </item>
    <item>
        <title>Slow Down to Speed Up</title>
        <link>https://wagslane.dev/posts/slow-down/</link>
        <pubDate>Mon, 02 Jan 2006 15:04:05 MST</pubDate>
    </item>
</channel></rss>"#;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn test_client() -> FeedClient {
    FeedClient::new(Duration::from_secs(5), "gator-test/1.0").unwrap()
}

async fn serve_at(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

async fn add_feed(db: &Database, name: &str, url: &str) -> Feed {
    let owner = match db.get_user_by_name("owner").await.unwrap() {
        Some(user) => user,
        None => db.create_user("owner").await.unwrap(),
    };
    db.create_feed(name, url, owner.id).await.unwrap()
}

async fn reload(db: &Database, feed: &Feed) -> Feed {
    db.get_feed_by_url(&feed.url).await.unwrap().unwrap()
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_reingesting_unchanged_feed_adds_nothing() {
    let server = MockServer::start().await;
    serve_at(&server, "/rss", ResponseTemplate::new(200).set_body_string(TWO_ITEM_RSS)).await;

    let db = test_db().await;
    let client = test_client();
    let feed = add_feed(&db, "Lane", &format!("{}/rss", server.uri())).await;

    let first = scrape_feed(&db, &client, &feed).await.unwrap();
    assert_eq!(first.items, 2);
    assert_eq!(first.inserted, 2);
    assert_eq!(first.duplicates, 0);

    let second = scrape_feed(&db, &client, &feed).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 2);

    let mut urls: Vec<String> = db
        .get_posts_for_feed(feed.id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.url)
        .collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "https://wagslane.dev/posts/slow-down/".to_string(),
            "https://wagslane.dev/posts/zen-of-proverbs/".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_named_zone_date_stored_as_utc() {
    let server = MockServer::start().await;
    serve_at(&server, "/rss", ResponseTemplate::new(200).set_body_string(TWO_ITEM_RSS)).await;

    let db = test_db().await;
    let feed = add_feed(&db, "Lane", &format!("{}/rss", server.uri())).await;
    scrape_feed(&db, &test_client(), &feed).await.unwrap();

    let posts = db.get_posts_for_feed(feed.id).await.unwrap();
    let slow = posts
        .iter()
        .find(|p| p.url.ends_with("slow-down/"))
        .unwrap();
    // 15:04:05 MST is 22:04:05 UTC
    assert_eq!(slow.published_at, Some(1_136_239_445));
    assert_eq!(slow.description, None);
}

// ============================================================================
// Per-item isolation
// ============================================================================

#[tokio::test]
async fn test_malformed_date_does_not_drop_sibling() {
    let rss = r#"<rss version="2.0"><channel><title>Mixed</title>
        <item><title>Bad date</title><link>https://example.com/bad</link>
              <pubDate>sometime last week</pubDate></item>
        <item><title>Good date</title><link>https://example.com/good</link>
              <pubDate>2024-05-01T12:00:00Z</pubDate></item>
    </channel></rss>"#;
    let server = MockServer::start().await;
    serve_at(&server, "/rss", ResponseTemplate::new(200).set_body_string(rss)).await;

    let db = test_db().await;
    let feed = add_feed(&db, "Mixed", &format!("{}/rss", server.uri())).await;

    let report = scrape_feed(&db, &test_client(), &feed).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.undated, 1);

    let posts = db.get_posts_for_feed(feed.id).await.unwrap();
    assert_eq!(posts.len(), 2);
    let bad = posts.iter().find(|p| p.title == "Bad date").unwrap();
    let good = posts.iter().find(|p| p.title == "Good date").unwrap();
    assert_eq!(bad.published_at, None);
    assert_eq!(good.published_at, Some(1_714_564_800));
}

#[tokio::test]
async fn test_linkless_and_untitled_items() {
    let rss = r#"<rss version="2.0"><channel><title>Sparse</title>
        <item><title>No link here</title></item>
        <item><link>https://example.com/untitled</link></item>
    </channel></rss>"#;
    let server = MockServer::start().await;
    serve_at(&server, "/rss", ResponseTemplate::new(200).set_body_string(rss)).await;

    let db = test_db().await;
    let feed = add_feed(&db, "Sparse", &format!("{}/rss", server.uri())).await;

    let report = scrape_feed(&db, &test_client(), &feed).await.unwrap();
    assert_eq!(report.items, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.inserted, 1);

    let posts = db.get_posts_for_feed(feed.id).await.unwrap();
    assert_eq!(posts[0].title, UNTITLED);
}

#[tokio::test]
async fn test_url_known_from_other_feed_counts_as_duplicate() {
    let server = MockServer::start().await;
    serve_at(&server, "/a", ResponseTemplate::new(200).set_body_string(TWO_ITEM_RSS)).await;
    serve_at(&server, "/b", ResponseTemplate::new(200).set_body_string(TWO_ITEM_RSS)).await;

    let db = test_db().await;
    let client = test_client();
    let a = add_feed(&db, "A", &format!("{}/a", server.uri())).await;
    let b = add_feed(&db, "B", &format!("{}/b", server.uri())).await;

    scrape_feed(&db, &client, &a).await.unwrap();
    let report = scrape_feed(&db, &client, &b).await.unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.duplicates, 2);
    assert_eq!(report.failed, 0);
}

// ============================================================================
// Feed-level failures
// ============================================================================

#[tokio::test]
async fn test_fetch_failure_still_advances_staleness() {
    let server = MockServer::start().await;
    serve_at(&server, "/down", ResponseTemplate::new(503)).await;
    serve_at(&server, "/up", ResponseTemplate::new(200).set_body_string(TWO_ITEM_RSS)).await;

    let db = test_db().await;
    let down = add_feed(&db, "Down", &format!("{}/down", server.uri())).await;
    let up = add_feed(&db, "Up", &format!("{}/up", server.uri())).await;

    let before = Utc::now().timestamp();
    let selected = next_feed(&db).await.unwrap();
    assert_eq!(selected.id, down.id);

    let err = scrape_feed(&db, &test_client(), &selected)
        .await
        .unwrap_err();
    match err {
        IngestError::Source {
            source: FeedError::Fetch(FetchError::HttpStatus(503)),
            ..
        } => {}
        e => panic!("Expected HttpStatus(503), got {:?}", e),
    }

    let down = reload(&db, &down).await;
    assert!(down.last_fetched_at.unwrap() >= before);
    assert!(db.get_posts_for_feed(down.id).await.unwrap().is_empty());

    // The failing feed moves behind the never-fetched one
    assert_eq!(next_feed(&db).await.unwrap().id, up.id);
}

#[tokio::test]
async fn test_parse_failure_writes_no_posts() {
    let server = MockServer::start().await;
    serve_at(
        &server,
        "/html",
        ResponseTemplate::new(200).set_body_string("<html><body>not a feed</body></html>"),
    )
    .await;

    let db = test_db().await;
    let feed = add_feed(&db, "Html", &format!("{}/html", server.uri())).await;

    let err = scrape_feed(&db, &test_client(), &feed).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Source {
            source: FeedError::Parse(_),
            ..
        }
    ));
    assert!(reload(&db, &feed).await.last_fetched_at.is_some());
    assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());
}

// ============================================================================
// Selection order across cycles
// ============================================================================

#[tokio::test]
async fn test_cycles_visit_feeds_stalest_first() {
    let server = MockServer::start().await;
    for route in ["/a", "/b", "/c"] {
        let rss = format!(
            r#"<rss><channel><title>{route}</title>
               <item><title>x</title><link>https://example.com{route}/1</link></item>
            </channel></rss>"#
        );
        serve_at(&server, route, ResponseTemplate::new(200).set_body_string(rss)).await;
    }

    let db = test_db().await;
    let now = Utc::now().timestamp();
    let c = add_feed(&db, "C", &format!("{}/c", server.uri())).await;
    let b = add_feed(&db, "B", &format!("{}/b", server.uri())).await;
    let a = add_feed(&db, "A", &format!("{}/a", server.uri())).await;
    db.mark_feed_fetched(b.id, now - 3_600).await.unwrap();
    db.mark_feed_fetched(c.id, now - 300).await.unwrap();

    let poller = Poller::new(db.clone(), test_client(), Duration::from_secs(60)).unwrap();
    let mut visited = Vec::new();
    for _ in 0..3 {
        visited.push(poller.run_cycle().await.unwrap().feed_id);
    }

    assert_eq!(visited, vec![a.id, b.id, c.id]);
}
