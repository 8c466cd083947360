//! Integration tests for walking an account's feed page by page.

use std::time::Duration;

use chrono::Utc;
use nitter_digest::feed::{FeedPoller, FeedWindow};
use nitter_digest::nitter::MirrorConfig;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// (title, status id, hours ago)
type Item<'a> = (&'a str, u32, i64);

fn rss(base: &str, items: &[Item]) -> String {
    let items: String = items
        .iter()
        .map(|(title, id, hours_ago)| {
            let published = (Utc::now() - chrono::Duration::hours(*hours_ago)).to_rfc2822();
            format!(
                r#"<item>
                  <title>{title}</title>
                  <dc:creator>@alice</dc:creator>
                  <description><![CDATA[<p>{title}</p>]]></description>
                  <pubDate>{published}</pubDate>
                  <guid>{base}/alice/status/{id}#m</guid>
                  <link>{base}/alice/status/{id}#m</link>
                </item>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>alice / @alice</title>
    <link>{base}/alice</link>
    <description>Twitter feed for: @alice</description>
    <image>
      <title>alice / @alice</title>
      <url>{base}/pic/alice.jpg</url>
      <link>{base}/alice</link>
    </image>
    {items}
  </channel>
</rss>"#
    )
}

fn page(body: String, cursor: Option<&str>) -> ResponseTemplate {
    let template = ResponseTemplate::new(200)
        .insert_header("content-type", "application/rss+xml")
        .set_body_string(body);
    match cursor {
        Some(cursor) => template.insert_header("min-id", cursor),
        None => template,
    }
}

fn poller(server: &MockServer) -> FeedPoller {
    let mirror = MirrorConfig::new(Url::parse(&server.uri()).expect("Invalid mock URL"));
    FeedPoller::new(mirror, Duration::from_secs(5)).expect("Failed to create poller")
}

fn ids(entries: &[nitter_digest::models::FeedEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.id.rsplit('/').next().unwrap_or_default().to_string())
        .collect()
}

// Mocks with a cursor matcher are mounted first so they take precedence over
// the bare first-page mock.

#[tokio::test]
async fn test_walks_pages_until_old_post() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .and(query_param("cursor", "c2"))
        .respond_with(page(
            rss(
                &base,
                &[
                    ("third", 3, 5),
                    ("RT by @alice: old repost", 4, 72),
                    ("old post", 5, 48),
                    ("older post", 6, 50),
                ],
            ),
            Some("c3"),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .and(query_param("cursor", "c3"))
        .respond_with(page(rss(&base, &[("never", 7, 1)]), None))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .respond_with(page(
            rss(&base, &[("first", 1, 1), ("RT by @alice: recent repost", 2, 2)]),
            Some("c2"),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let entries = poller(&server)
        .fetch_account("@alice", &FeedWindow::last_hours(24, 10))
        .await
        .expect("Feed walk failed");

    assert_eq!(ids(&entries), vec!["1#m", "2#m", "3#m"]);
    let avatar = format!("{base}/pic/alice.jpg");
    assert!(entries.iter().all(|e| e.avatar_url.as_deref() == Some(avatar.as_str())));
    assert!(entries.iter().all(|e| e.handle == "alice"));
}

#[tokio::test]
async fn test_stops_at_per_account_cap() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .and(query_param("cursor", "c2"))
        .respond_with(page(rss(&base, &[("more", 9, 1)]), None))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .respond_with(page(
            rss(&base, &[("one", 1, 1), ("two", 2, 2), ("three", 3, 3)]),
            Some("c2"),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let entries = poller(&server)
        .fetch_account("alice", &FeedWindow::last_hours(24, 2))
        .await
        .expect("Feed walk failed");

    assert_eq!(ids(&entries), vec!["1#m", "2#m"]);
}

#[tokio::test]
async fn test_repeated_cursor_ends_walk() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .and(query_param("cursor", "same"))
        .respond_with(page(rss(&base, &[("second page", 2, 2)]), Some("same")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .respond_with(page(rss(&base, &[("first page", 1, 1)]), Some("same")))
        .expect(1)
        .mount(&server)
        .await;

    let entries = poller(&server)
        .fetch_account("alice", &FeedWindow::last_hours(24, 10))
        .await
        .expect("Feed walk failed");

    assert_eq!(ids(&entries), vec!["1#m", "2#m"]);
}

#[tokio::test]
async fn test_later_page_failure_keeps_collected() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .and(query_param("cursor", "c2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .respond_with(page(rss(&base, &[("first", 1, 1)]), Some("c2")))
        .expect(1)
        .mount(&server)
        .await;

    let entries = poller(&server)
        .fetch_account("alice", &FeedWindow::last_hours(24, 10))
        .await
        .expect("Feed walk failed");

    assert_eq!(ids(&entries), vec!["1#m"]);
}

#[tokio::test]
async fn test_first_page_failure_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = poller(&server)
        .fetch_account("alice", &FeedWindow::last_hours(24, 10))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_empty_feed() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/alice/rss"))
        .respond_with(page(rss(&base, &[]), Some("c2")))
        .expect(1)
        .mount(&server)
        .await;

    let entries = poller(&server)
        .fetch_account("alice", &FeedWindow::last_hours(24, 10))
        .await
        .expect("Feed walk failed");

    assert!(entries.is_empty());
}
