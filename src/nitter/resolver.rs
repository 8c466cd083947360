use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::fetcher::{StatusExtract, StatusFetcher};
use super::normalize::{extract_status_url_from_text, same_status};
use super::{polite_pause, MirrorConfig};
use crate::models::QuoteNode;

/// Anything that can turn a status URL into extracted content.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch one status. Failures are reported as an empty extract.
    async fn fetch_status(&self, url: &str) -> StatusExtract;
}

#[async_trait]
impl StatusSource for StatusFetcher {
    async fn fetch_status(&self, url: &str) -> StatusExtract {
        Self::fetch_status(self, url).await
    }
}

/// Follows "this quotes that" links into a bounded [`QuoteNode`] chain.
pub struct QuoteResolver<'a, S: StatusSource + ?Sized> {
    source: &'a S,
    mirror: &'a MirrorConfig,
    pause: Duration,
}

impl<'a, S: StatusSource + ?Sized> QuoteResolver<'a, S> {
    #[must_use]
    pub const fn new(source: &'a S, mirror: &'a MirrorConfig) -> Self {
        Self {
            source,
            mirror,
            pause: Duration::ZERO,
        }
    }

    /// Pause up to `pause` between successive levels of a chain.
    #[must_use]
    pub const fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Resolve the quote chain starting at `url`.
    ///
    /// Returns `None` when the first fetch yields neither author nor text. A
    /// failed fetch further down truncates the chain at that level. The chain
    /// never exceeds the mirror's `max_depth`, and a status that links back to
    /// itself is not followed.
    pub async fn resolve(&self, url: &str) -> Option<QuoteNode> {
        let mut levels: Vec<(String, StatusExtract)> = Vec::new();
        let mut current = url.trim().to_string();

        while levels.len() < self.mirror.max_depth && !current.is_empty() {
            if !levels.is_empty() {
                polite_pause(self.pause).await;
            }

            let depth = levels.len();
            let extract = self.source.fetch_status(&current).await;
            if extract.is_empty() {
                debug!(url = %current, depth, "Nothing extracted, ending quote chain");
                break;
            }

            let next = extract
                .nested_quote_url
                .clone()
                .or_else(|| {
                    extract
                        .text
                        .as_deref()
                        .and_then(extract_status_url_from_text)
                })
                .and_then(|link| self.mirror.normalize(&link));

            levels.push((current.clone(), extract));

            match next {
                Some(next) if !same_status(&next, &current) => {
                    debug!(url = %current, next = %next, depth, "Following nested quote");
                    current = next;
                }
                Some(_) => {
                    debug!(url = %current, depth, "Status quotes itself, not following");
                    break;
                }
                None => break,
            }
        }

        if levels.len() == self.mirror.max_depth {
            debug!(url = %url, max_depth = self.mirror.max_depth, "Quote chain hit depth limit");
        }

        let root = levels
            .into_iter()
            .rev()
            .fold(None, |child: Option<QuoteNode>, (url, extract)| {
                Some(QuoteNode {
                    url,
                    author: extract.author,
                    text: extract.text,
                    image_urls: extract.image_urls,
                    published: extract.published.map(|ts| ts.to_rfc3339()),
                    video_attachments: extract.video_attachments,
                    nested_quote: child.map(Box::new),
                })
            });

        if let Some(root) = &root {
            info!(url = %url, levels = root.depth(), "Resolved quote chain");
        }
        root
    }
}
