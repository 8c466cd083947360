//! Nitter mirror access: link normalization, status-page scraping and
//! quote-chain resolution.

mod fetcher;
mod normalize;
mod resolver;
mod retry;

pub use fetcher::{parse_status_page, parse_status_timestamp, StatusExtract, StatusFetcher};
pub use normalize::{
    extract_status_url_from_html, extract_status_url_from_text, handle_from_status_url,
    is_status_url, normalize_status_url, same_status, to_x_url,
};
pub use resolver::{QuoteResolver, StatusSource};
pub use retry::RetryPolicy;

use url::Url;

/// Maximum quote-chain length when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Where status pages are fetched from and how far quote chains are followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub base_url: Url,
    pub max_depth: usize,
}

impl MirrorConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Normalize a link found on a mirror page or in a feed entry.
    #[must_use]
    pub fn normalize(&self, link: &str) -> Option<String> {
        normalize_status_url(link, Some(&self.base_url))
    }
}

/// Sleep for a random interval between half of `max` and `max`.
///
/// Successive requests to the mirror are spaced out with this; a zero `max`
/// returns immediately.
pub async fn polite_pause(max: std::time::Duration) {
    if max.is_zero() {
        return;
    }
    let max_ms = max.as_millis().max(1) as u64;
    let millis = {
        use rand::Rng;
        rand::thread_rng().gen_range(max_ms / 2..=max_ms)
    };
    tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
}
