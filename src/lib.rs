//! Nitter digest library.
//!
//! Polls account feeds through a Nitter mirror, follows quoted posts to a
//! bounded depth, and renders the result as an email digest.

// HTML fixtures use r#"..."# throughout.
#![allow(clippy::needless_raw_string_hashes)]

pub mod accounts;
pub mod config;
pub mod constants;
pub mod db;
pub mod feed;
pub mod mailer;
pub mod media;
pub mod models;
pub mod nitter;
pub mod pipeline;
pub mod render;
pub mod sanitize;
