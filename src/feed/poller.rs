use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::FETCH_USER_AGENT;
use crate::models::FeedEntry;
use crate::nitter::{polite_pause, MirrorConfig};

/// Upper bound on pages walked per account.
pub const MAX_PAGES: usize = 10;

/// Response header carrying the cursor for the next (older) page.
const CURSOR_HEADER: &str = "min-id";

/// Title prefix marking a repost.
const REPOST_PREFIX: &str = "RT by @";

static IMG_SRC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("Invalid selector"));

/// Which entries count as recent enough, and how many to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub cutoff: DateTime<Utc>,
    pub max_posts: usize,
}

impl FeedWindow {
    /// Entries published within the last `hours`.
    #[must_use]
    pub fn last_hours(hours: u32, max_posts: usize) -> Self {
        Self {
            cutoff: Utc::now() - chrono::Duration::hours(i64::from(hours)),
            max_posts,
        }
    }
}

/// One parsed feed page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub entries: Vec<FeedEntry>,
    /// The channel image, which the mirror sets to the account's avatar.
    pub avatar_url: Option<String>,
}

/// Walks an account's feed backwards page by page.
#[derive(Debug, Clone)]
pub struct FeedPoller {
    client: Client,
    mirror: MirrorConfig,
    page_pause: Duration,
}

impl FeedPoller {
    /// Create a poller with a per-request timeout.
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
            page_pause: Duration::ZERO,
        })
    }

    /// Pause up to `pause` between pages.
    #[must_use]
    pub const fn with_page_pause(mut self, pause: Duration) -> Self {
        self.page_pause = pause;
        self
    }

    /// Collect an account's entries inside `window`, newest first.
    ///
    /// Walking stops at the first non-repost older than the cutoff; old
    /// reposts are skipped since reposts surface out of order. It also stops
    /// when the cap is reached, the cursor runs out or repeats, a page is
    /// empty, or after [`MAX_PAGES`] pages.
    ///
    /// # Errors
    ///
    /// Returns an error if the first page cannot be fetched. Failures on
    /// later pages end the walk with what was collected so far.
    pub async fn fetch_account(&self, handle: &str, window: &FeedWindow) -> Result<Vec<FeedEntry>> {
        let handle = handle.trim_start_matches('@');
        let mut collected: Vec<FeedEntry> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut avatar_url: Option<String> = None;

        for page_number in 1..=MAX_PAGES {
            let (page, next_cursor) = match self.fetch_page(handle, cursor.as_deref()).await {
                Ok(result) => result,
                Err(e) if page_number == 1 => return Err(e),
                Err(e) => {
                    warn!(handle = %handle, page = page_number, "Stopping feed walk: {e:#}");
                    break;
                }
            };

            if page_number == 1 {
                avatar_url = page.avatar_url.clone();
            }
            if page.entries.is_empty() {
                debug!(handle = %handle, page = page_number, "Empty feed page");
                break;
            }

            let mut reached_old = false;
            for mut entry in page.entries {
                let is_repost = entry.title.starts_with(REPOST_PREFIX);
                if entry.published < window.cutoff {
                    if is_repost {
                        continue;
                    }
                    debug!(handle = %handle, published = %entry.published, "Reached entry older than window");
                    reached_old = true;
                    break;
                }
                if entry.avatar_url.is_none() {
                    entry.avatar_url.clone_from(&avatar_url);
                }
                collected.push(entry);
                if collected.len() >= window.max_posts {
                    debug!(handle = %handle, max_posts = window.max_posts, "Reached per-account cap");
                    reached_old = true;
                    break;
                }
            }

            let advance = next_cursor.filter(|next| cursor.as_deref() != Some(next.as_str()));
            match advance {
                Some(next) if !reached_old => {
                    debug!(handle = %handle, page = page_number, kept = collected.len(), "Continuing to older page");
                    cursor = Some(next);
                    polite_pause(self.page_pause).await;
                }
                _ => break,
            }
        }

        info!(handle = %handle, entries = collected.len(), "Fetched account feed");
        Ok(collected)
    }

    async fn fetch_page(&self, handle: &str, cursor: Option<&str>) -> Result<(FeedPage, Option<String>)> {
        let url = self.feed_url(handle, cursor)?;
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed {url}"))?;

        if !response.status().is_success() {
            bail!("Feed fetch for @{handle} failed with status {}", response.status());
        }

        let next_cursor = response
            .headers()
            .get(CURSOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let body = response.bytes().await.context("Failed to read feed body")?;
        let page = parse_feed_page(&body, handle, &self.mirror)?;
        Ok((page, next_cursor))
    }

    fn feed_url(&self, handle: &str, cursor: Option<&str>) -> Result<Url> {
        let joined = self
            .mirror
            .normalize(&format!("{handle}/rss"))
            .context("Empty feed path")?;
        let mut url = Url::parse(&joined).with_context(|| format!("Invalid feed URL {joined}"))?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", cursor);
        }
        Ok(url)
    }
}

/// Parse one page of an account's RSS feed.
///
/// Entries without a publish time are skipped.
///
/// # Errors
///
/// Returns an error if the body is not a parseable feed.
pub fn parse_feed_page(body: &[u8], handle: &str, mirror: &MirrorConfig) -> Result<FeedPage> {
    let feed = feed_rs::parser::parse(body).context("Failed to parse RSS feed")?;
    let avatar_url = feed
        .logo
        .as_ref()
        .and_then(|image| mirror.normalize(&image.uri));

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let id = if entry.id.trim().is_empty() {
                link.clone()
            } else {
                entry.id.clone()
            };
            if id.is_empty() {
                return None;
            }

            let Some(published) = entry.published.or(entry.updated) else {
                debug!(id = %id, "Skipping entry without publish time");
                return None;
            };

            let summary = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .unwrap_or_default();
            let description = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .unwrap_or_else(|| summary.clone());

            let mut image_urls: Vec<String> = Html::parse_fragment(&description)
                .select(&IMG_SRC)
                .filter_map(|img| img.value().attr("src"))
                .filter_map(|src| mirror.normalize(src))
                .collect();
            for media in &entry.media {
                for content in &media.content {
                    let is_image = content
                        .content_type
                        .as_ref()
                        .is_some_and(|t| t.essence().to_string().starts_with("image/"));
                    if let Some(url) = content.url.as_ref().filter(|_| is_image) {
                        let url = url.to_string();
                        if !image_urls.contains(&url) {
                            image_urls.push(url);
                        }
                    }
                }
            }

            Some(FeedEntry {
                id,
                handle: handle.to_string(),
                author: entry.authors.first().map(|a| a.name.clone()),
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                summary,
                description,
                published,
                link,
                image_urls,
                avatar_url: None,
            })
        })
        .collect();

    Ok(FeedPage {
        entries,
        avatar_url,
    })
}
