//! Account feeds from the mirror's RSS endpoint.

mod poller;

pub use poller::{parse_feed_page, FeedPage, FeedPoller, FeedWindow, MAX_PAGES};
