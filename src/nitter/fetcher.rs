use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

use super::retry::RetryPolicy;
use super::MirrorConfig;
use crate::constants::FETCH_USER_AGENT;
use crate::models::VideoAttachment;

/// Format of the `title` attribute on a status page's date link, minus the
/// trailing timezone abbreviation.
const STATUS_DATE_FORMAT: &str = "%b %d, %Y · %I:%M %p";

static MAIN_TWEET: LazyLock<Selector> = LazyLock::new(|| sel(".main-tweet"));
static USERNAME: LazyLock<Selector> = LazyLock::new(|| sel(".tweet-header .username"));
static CONTENT: LazyLock<Selector> = LazyLock::new(|| sel(".tweet-content"));
static INLINE_QUOTE_LINK: LazyLock<Selector> =
    LazyLock::new(|| sel(r#"a.quote-link, a[href*="/status/"]"#));
static QUOTE_BLOCK_LINK: LazyLock<Selector> = LazyLock::new(|| sel(".quote a.quote-link"));
static DATE_LINK: LazyLock<Selector> = LazyLock::new(|| sel(".tweet-date a[title]"));
static STILL_IMAGE: LazyLock<Selector> = LazyLock::new(|| sel(".attachments .still-image img"));
static VIDEO_POSTER: LazyLock<Selector> = LazyLock::new(|| sel(".attachments video[poster]"));
static VIDEO_THUMB: LazyLock<Selector> =
    LazyLock::new(|| sel(".attachments .video-container img"));

/// Profile-page avatar selectors, most specific first.
static AVATAR_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        ".profile-card .profile-card-avatar img",
        ".profile-card .avatar img",
        ".avatar img",
        "img.avatar",
        r#"img[class*="avatar"]"#,
        r#"img[src*="/pic/"][src*="profile_images"]"#,
    ]
    .iter()
    .map(|s| sel(s))
    .collect()
});
static PROFILE_PRESENT: LazyLock<Selector> = LazyLock::new(|| sel(".profile-card, .timeline"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid selector")
}

/// What a status page yielded. Every field is optional; a failed fetch
/// produces the default (all-empty) value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusExtract {
    pub author: Option<String>,
    pub text: Option<String>,
    pub image_urls: Vec<String>,
    pub video_attachments: Vec<VideoAttachment>,
    pub nested_quote_url: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl StatusExtract {
    /// Neither an author nor any text was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.text.is_none()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient network error: {0}")]
    Transient(#[source] reqwest::Error),
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl FetchError {
    fn from_send(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::Transient(e)
        } else {
            Self::Request(e)
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Fetches and scrapes status and profile pages from the mirror.
#[derive(Debug, Clone)]
pub struct StatusFetcher {
    client: Client,
    mirror: MirrorConfig,
    retry: RetryPolicy,
}

impl StatusFetcher {
    /// Create a fetcher with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(mirror: MirrorConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(FETCH_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            mirror,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn mirror(&self) -> &MirrorConfig {
        &self.mirror
    }

    /// Fetch a status page and extract its content.
    ///
    /// Never fails: network errors, HTTP errors and missing page structure
    /// all degrade to an empty or partial [`StatusExtract`].
    pub async fn fetch_status(&self, url: &str) -> StatusExtract {
        if url.trim().is_empty() {
            return StatusExtract::default();
        }

        match self.fetch_page(url).await {
            Ok(html) => {
                let extract = parse_status_page(&html, &self.mirror, url);
                debug!(
                    url = %url,
                    author = ?extract.author,
                    images = extract.image_urls.len(),
                    nested = ?extract.nested_quote_url,
                    "Fetched status page"
                );
                extract
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch status page");
                StatusExtract::default()
            }
        }
    }

    /// Look up an account's avatar URL from its profile page.
    pub async fn fetch_avatar_url(&self, handle: &str) -> Option<String> {
        let profile_url = self.mirror.normalize(handle.trim_start_matches('@'))?;

        let html = match self.fetch_page(&profile_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(handle = %handle, error = %e, "Failed to fetch profile page");
                return None;
            }
        };

        let avatar = parse_avatar_url(&html, &self.mirror);
        if avatar.is_none() {
            debug!(handle = %handle, "No avatar found on profile page");
        }
        avatar
    }

    /// GET a page with retries on transient failures.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.retry
            .run(|| self.get_once(url), FetchError::is_transient)
            .await
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_send)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        response.text().await.map_err(FetchError::from_send)
    }
}

/// Extract a status page's main post.
///
/// `page_url` is the address the page was fetched from; it becomes the
/// click-through target for video thumbnails.
#[must_use]
pub fn parse_status_page(html: &str, mirror: &MirrorConfig, page_url: &str) -> StatusExtract {
    let mut document = Html::parse_document(html);

    // Inline quote links are captured and then removed so their text does not
    // leak into the body.
    let (main_id, body_id, mut nested_quote_url, link_ids) = {
        let Some(main) = document.select(&MAIN_TWEET).next() else {
            debug!(url = %page_url, "Status page has no main tweet region");
            return StatusExtract::default();
        };
        let body = main
            .select(&CONTENT)
            .find(|e| !inside_quote_block(e, &main));
        let links: Vec<ElementRef> = body
            .map(|b| b.select(&INLINE_QUOTE_LINK).collect())
            .unwrap_or_default();
        let nested = links
            .iter()
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| mirror.normalize(href));
        let link_ids: Vec<_> = links.iter().map(|a| a.id()).collect();
        (main.id(), body.map(|b| b.id()), nested, link_ids)
    };
    for id in link_ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let Some(main) = document.tree.get(main_id).and_then(ElementRef::wrap) else {
        return StatusExtract::default();
    };
    let body = body_id
        .and_then(|id| document.tree.get(id))
        .and_then(ElementRef::wrap);

    let author = main
        .select(&USERNAME)
        .find(|e| !inside_quote_block(e, &main))
        .map(|e| e.text().collect::<String>())
        .map(|name| name.trim().trim_start_matches('@').to_string())
        .filter(|name| !name.is_empty());

    let text = body
        .map(|body| body.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty());

    if nested_quote_url.is_none() {
        nested_quote_url = main
            .select(&QUOTE_BLOCK_LINK)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| mirror.normalize(href));
    }

    let published = main
        .select(&DATE_LINK)
        .find(|e| !inside_quote_block(e, &main))
        .and_then(|a| a.value().attr("title"))
        .and_then(|title| match parse_status_timestamp(title) {
            Some(ts) => Some(ts),
            None => {
                warn!(url = %page_url, title = %title, "Unparseable status timestamp");
                None
            }
        });

    let image_urls = main
        .select(&STILL_IMAGE)
        .filter(|img| !inside_quote_block(img, &main))
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| mirror.normalize(src))
        .collect();

    let mut thumbnails: Vec<String> = Vec::new();
    let posters = main
        .select(&VIDEO_POSTER)
        .filter(|v| !inside_quote_block(v, &main))
        .filter_map(|v| v.value().attr("poster"));
    let stills = main
        .select(&VIDEO_THUMB)
        .filter(|img| !inside_quote_block(img, &main))
        .filter_map(|img| img.value().attr("src"));
    for src in posters.chain(stills) {
        if let Some(url) = mirror.normalize(src) {
            if !thumbnails.contains(&url) {
                thumbnails.push(url);
            }
        }
    }
    let video_attachments = thumbnails
        .into_iter()
        .map(|thumbnail_url| VideoAttachment {
            thumbnail_url,
            video_url: page_url.to_string(),
        })
        .collect();

    StatusExtract {
        author,
        text,
        image_urls,
        video_attachments,
        nested_quote_url,
        published,
    }
}

/// Parse a status date title such as `"Jan 15, 2025 · 10:30 PM UTC"`.
///
/// The trailing zone abbreviation is ignored; the time is taken as UTC.
#[must_use]
pub fn parse_status_timestamp(title: &str) -> Option<DateTime<Utc>> {
    let title = title.trim();
    let without_zone = match title.rsplit_once(' ') {
        Some((rest, zone)) if zone.chars().all(|c| c.is_ascii_alphabetic()) && zone != "AM" && zone != "PM" => rest,
        _ => title,
    };
    NaiveDateTime::parse_from_str(without_zone.trim(), STATUS_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_avatar_url(html: &str, mirror: &MirrorConfig) -> Option<String> {
    let document = Html::parse_document(html);

    // Suspended or missing accounts render neither a profile card nor a timeline.
    if document.select(&PROFILE_PRESENT).next().is_none() {
        return None;
    }

    AVATAR_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| mirror.normalize(src))
}

/// Whether an element sits inside an embedded quote block below `main`.
fn inside_quote_block(element: &ElementRef, main: &ElementRef) -> bool {
    for ancestor in element.ancestors() {
        if ancestor.id() == main.id() {
            return false;
        }
        if let Some(el) = ancestor.value().as_element() {
            if el.classes().any(|c| c == "quote" || c == "quote-big") {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use url::Url;

    use super::*;

    fn mirror() -> MirrorConfig {
        MirrorConfig::new(Url::parse("https://nitter.example.com/").unwrap())
    }

    const PAGE: &str = r##"
        <html><body>
        <div class="main-tweet">
          <div class="timeline-item">
            <div class="tweet-header">
              <a class="fullname" href="/alice">Alice</a>
              <a class="username" href="/alice">@alice</a>
            </div>
            <div class="tweet-content media-body">Look at this
              <a href="https://nitter.example.com/bob/status/42#m">nitter.example.com/bob/status/42#m</a>
            </div>
            <span class="tweet-date"><a href="/alice/status/1#m" title="Jan 15, 2025 · 10:30 PM UTC">Jan 15</a></span>
            <div class="attachments">
              <div class="gallery-row">
                <a class="still-image" href="/pic/orig/one.jpg"><img src="/pic/one.jpg"></a>
              </div>
            </div>
            <div class="quote quote-big">
              <a class="quote-link" href="/carol/status/77#m"></a>
              <div class="tweet-name-row"><a class="username" href="/carol">@carol</a></div>
              <div class="quote-text">quoted words</div>
              <div class="attachments"><a class="still-image"><img src="/pic/quoted.jpg"></a></div>
            </div>
          </div>
        </div>
        <div class="replies"><img src="/pic/unrelated.jpg"></div>
        </body></html>
    "##;

    #[test]
    fn test_parse_status_page() {
        let extract = parse_status_page(PAGE, &mirror(), "https://nitter.example.com/alice/status/1");

        assert_eq!(extract.author.as_deref(), Some("alice"));
        assert_eq!(extract.text.as_deref(), Some("Look at this"));
        assert_eq!(
            extract.nested_quote_url.as_deref(),
            Some("https://nitter.example.com/bob/status/42#m")
        );
        assert_eq!(
            extract.image_urls,
            vec!["https://nitter.example.com/pic/one.jpg"]
        );
        assert_eq!(
            extract.published,
            Some(Utc.with_ymd_and_hms(2025, 1, 15, 22, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_quote_block_fallback() {
        let page = PAGE.replace(
            r#"<a href="https://nitter.example.com/bob/status/42#m">nitter.example.com/bob/status/42#m</a>"#,
            "",
        );
        let extract = parse_status_page(&page, &mirror(), "https://nitter.example.com/alice/status/1");
        assert_eq!(
            extract.nested_quote_url.as_deref(),
            Some("https://nitter.example.com/carol/status/77#m")
        );
        assert_eq!(extract.author.as_deref(), Some("alice"));
    }

    #[test]
    fn test_missing_main_tweet() {
        let extract = parse_status_page(
            "<html><body><p>Tweet not found</p></body></html>",
            &mirror(),
            "https://nitter.example.com/x/status/1",
        );
        assert!(extract.is_empty());
        assert_eq!(extract, StatusExtract::default());
    }

    #[test]
    fn test_bad_timestamp_is_absent() {
        let page = PAGE.replace("Jan 15, 2025 · 10:30 PM UTC", "sometime last week");
        let extract = parse_status_page(&page, &mirror(), "https://nitter.example.com/alice/status/1");
        assert_eq!(extract.published, None);
        assert_eq!(extract.author.as_deref(), Some("alice"));
    }

    #[test]
    fn test_video_thumbnail() {
        let page = r#"<div class="main-tweet"><div class="tweet-header"><a class="username">@v</a></div>
            <div class="attachments"><div class="gallery-video"><video poster="/pic/thumb.jpg"></video></div></div></div>"#;
        let extract = parse_status_page(page, &mirror(), "https://nitter.example.com/v/status/5");
        assert_eq!(
            extract.video_attachments,
            vec![VideoAttachment {
                thumbnail_url: "https://nitter.example.com/pic/thumb.jpg".to_string(),
                video_url: "https://nitter.example.com/v/status/5".to_string(),
            }]
        );
        assert_eq!(extract.text, None);
    }

    #[test]
    fn test_quoted_video_stays_with_quote() {
        let page = r#"<div class="main-tweet">
            <div class="tweet-header"><a class="username">@alice</a></div>
            <div class="tweet-content">outer text</div>
            <div class="quote quote-big">
              <a class="quote-link" href="/carol/status/7#m"></a>
              <div class="attachments"><div class="gallery-video">
                <video poster="/pic/carol_thumb.jpg"></video>
              </div></div>
            </div></div>"#;
        let extract = parse_status_page(page, &mirror(), "https://nitter.example.com/alice/status/1");
        assert!(extract.video_attachments.is_empty());
        assert_eq!(
            extract.nested_quote_url.as_deref(),
            Some("https://nitter.example.com/carol/status/7#m")
        );
    }

    #[test]
    fn test_video_thumbnail_deduplicated() {
        let page = r#"<div class="main-tweet"><div class="tweet-header"><a class="username">@v</a></div>
            <div class="attachments"><div class="video-container">
              <video poster="/pic/thumb.jpg"></video><img src="/pic/thumb.jpg">
            </div></div></div>"#;
        let extract = parse_status_page(page, &mirror(), "https://nitter.example.com/v/status/5");
        assert_eq!(extract.video_attachments.len(), 1);
    }

    #[test]
    fn test_parse_status_timestamp() {
        assert_eq!(
            parse_status_timestamp("Mar 3, 2024 · 9:05 AM PST"),
            Some(Utc.with_ymd_and_hms(2024, 3, 3, 9, 5, 0).unwrap())
        );
        assert_eq!(
            parse_status_timestamp("Dec 31, 2023 · 11:59 PM"),
            Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 0).unwrap())
        );
        assert_eq!(parse_status_timestamp("yesterday"), None);
    }

    #[test]
    fn test_parse_avatar_url() {
        let page = r#"<div class="profile-card"><a class="profile-card-avatar" href="/pic/big.jpg">
            <img src="/pic/profile_images/small.jpg"></a></div>"#;
        assert_eq!(
            parse_avatar_url(page, &mirror()).as_deref(),
            Some("https://nitter.example.com/pic/profile_images/small.jpg")
        );
        assert_eq!(parse_avatar_url("<p>User not found</p>", &mirror()), None);
    }
}
