//! Integration tests for image download and re-hosting.

use std::time::Duration;

use chrono::NaiveDate;
use nitter_digest::media::{ImageServer, MediaStore};
use nitter_digest::models::{QuoteNode, VideoAttachment};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

async fn image_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pic/one.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(PNG_BYTES),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pic/media/noext"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/gif")
                .set_body_bytes(b"GIF89a".as_slice()),
        )
        .mount(&server)
        .await;
    server
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
}

fn store(temp: &TempDir, rehost: bool) -> MediaStore {
    let server = rehost.then(|| ImageServer::new(temp.path().join("www"), "https://img.example/"));
    MediaStore::new(temp.path().join("images"), server, Duration::from_secs(5))
        .expect("Failed to create media store")
        .with_date(date())
}

#[tokio::test]
async fn test_store_images_rehosts_and_drops_failures() {
    let server = image_server().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let media = store(&temp, true);

    let urls = vec![
        format!("{}/pic/one.png", server.uri()),
        format!("{}/pic/missing.jpg", server.uri()),
        format!("{}/pic/media/noext", server.uri()),
    ];
    let stored = media.store_images(&urls, "alice_1").await;

    // The failed second image is dropped; numbering follows the input position.
    assert_eq!(
        stored,
        vec![
            "https://img.example/2025-01-15/alice_1_1.png",
            "https://img.example/2025-01-15/alice_1_3.gif",
        ]
    );
    let local = temp.path().join("images/2025-01-15/alice_1_1.png");
    assert_eq!(std::fs::read(local).unwrap(), PNG_BYTES);
    assert!(temp.path().join("www/2025-01-15/alice_1_1.png").exists());
    assert!(temp.path().join("www/2025-01-15/alice_1_3.gif").exists());
}

#[tokio::test]
async fn test_without_server_links_source() {
    let server = image_server().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let media = store(&temp, false);
    assert!(!media.rehosting());

    let url = format!("{}/pic/one.png", server.uri());
    assert_eq!(media.store_image(&url, "alice_1_1").await, Some(url));
    assert!(temp.path().join("images/2025-01-15/alice_1_1.png").exists());
}

#[tokio::test]
async fn test_published_names_are_web_safe() {
    let server = image_server().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let media = store(&temp, true);

    let stored = media
        .store_image(&format!("{}/pic/one.png", server.uri()), "alice_1#m")
        .await;
    assert_eq!(
        stored.as_deref(),
        Some("https://img.example/2025-01-15/alice_1_m.png")
    );
}

#[tokio::test]
async fn test_rehost_quote_tree() {
    let server = image_server().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let media = store(&temp, true);
    let base = server.uri();

    let tree = QuoteNode {
        url: format!("{base}/bob/status/2#m"),
        author: Some("bob".to_string()),
        text: Some("outer".to_string()),
        image_urls: vec![format!("{base}/pic/one.png"), format!("{base}/pic/gone.jpg")],
        published: None,
        video_attachments: vec![],
        nested_quote: Some(Box::new(QuoteNode {
            url: format!("{base}/carol/status/3#m"),
            author: Some("carol".to_string()),
            text: Some("inner".to_string()),
            image_urls: vec![format!("{base}/pic/media/noext")],
            published: None,
            video_attachments: vec![
                VideoAttachment {
                    thumbnail_url: format!("{base}/pic/one.png"),
                    video_url: format!("{base}/carol/status/3#m"),
                },
                VideoAttachment {
                    thumbnail_url: format!("{base}/pic/broken.jpg"),
                    video_url: format!("{base}/carol/status/3#m"),
                },
            ],
            nested_quote: None,
        })),
    };

    let rehosted = media.rehost_quote_images(tree, "alice_1").await;

    assert_eq!(
        rehosted.image_urls,
        vec!["https://img.example/2025-01-15/alice_1_quote0_1.png"]
    );
    let inner = rehosted.nested_quote.as_deref().expect("Nested quote lost");
    assert_eq!(
        inner.image_urls,
        vec!["https://img.example/2025-01-15/alice_1_quote1_1.gif"]
    );
    assert_eq!(
        inner.video_attachments[0].thumbnail_url,
        "https://img.example/2025-01-15/alice_1_quote1_video1.png"
    );
    // A thumbnail that cannot be fetched keeps its source URL.
    assert_eq!(
        inner.video_attachments[1].thumbnail_url,
        format!("{base}/pic/broken.jpg")
    );
    assert_eq!(inner.text.as_deref(), Some("inner"));
}

#[tokio::test]
async fn test_store_avatar() {
    let server = image_server().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let media = store(&temp, true);

    let stored = media
        .store_avatar("alice", &format!("{}/pic/one.png", server.uri()))
        .await
        .expect("Avatar not stored");
    assert!(stored.starts_with("https://img.example/2025-01-15/alice_profile_"));
    assert!(stored.ends_with(".png"));

    assert_eq!(
        media
            .store_avatar("bob", &format!("{}/pic/nothing.png", server.uri()))
            .await,
        None
    );
}
