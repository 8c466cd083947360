//! Email markup for quote trees, posts and whole digests.

mod digest;
mod post;
mod quote;

pub use digest::render_digest;
pub use post::PostCard;
pub use quote::{render_quote_html, QuoteBox};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Display format for post and quote timestamps.
pub const DISPLAY_TIME_FORMAT: &str = "%I:%M %p · %b %d, %Y";

/// What every renderer needs beyond the data being rendered.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub timezone: Tz,
    /// Handle to re-hosted avatar URL.
    pub avatars: HashMap<String, String>,
}

impl RenderContext {
    #[must_use]
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            avatars: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_avatars(mut self, avatars: HashMap<String, String>) -> Self {
        self.avatars = avatars;
        self
    }

    #[must_use]
    pub fn avatar(&self, handle: &str) -> Option<&str> {
        self.avatars
            .get(handle.trim_start_matches('@'))
            .map(String::as_str)
    }

    /// Format a UTC instant in the display timezone.
    #[must_use]
    pub fn format_time(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.timezone)
            .format(DISPLAY_TIME_FORMAT)
            .to_string()
    }

    /// Format a stored RFC 3339 timestamp. Invalid input yields `None`.
    #[must_use]
    pub fn format_stored_time(&self, stored: &str) -> Option<String> {
        DateTime::parse_from_rfc3339(stored.trim())
            .ok()
            .map(|ts| self.format_time(ts.with_timezone(&Utc)))
    }
}
