//! Shared constants used across the application.

/// User agent string used for requests to the Nitter mirror.
///
/// Some mirrors refuse obviously automated clients, so this mirrors a
/// mainstream desktop browser.
pub const FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Attribution marker shown before quoted authors.
pub const QUOTE_MARKER: &str = "💬";
