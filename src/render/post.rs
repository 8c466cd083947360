use maud::{html, Markup, PreEscaped, Render};

use super::quote::QuoteBox;
use super::RenderContext;
use crate::constants::QUOTE_MARKER;
use crate::models::{EnrichedPost, QuoteContent};
use crate::nitter::handle_from_status_url;
use crate::sanitize::{format_tweet_body, LINK_STYLE};

const QUOTE_CONTAINER_STYLE: &str = "border: 1px solid #e1e8ed; border-radius: 12px; \
    padding: 12px; margin-top: 12px; background: #f7f9fa;";

/// A single post as it appears in the digest.
#[derive(Debug, Clone, Copy)]
pub struct PostCard<'a> {
    pub post: &'a EnrichedPost,
    pub ctx: &'a RenderContext,
}

impl<'a> PostCard<'a> {
    #[must_use]
    pub const fn new(post: &'a EnrichedPost, ctx: &'a RenderContext) -> Self {
        Self { post, ctx }
    }

    fn body(&self) -> String {
        let post = &self.post.post;
        let raw = if post.raw_description.trim().is_empty() {
            &post.summary
        } else {
            &post.raw_description
        };
        format_tweet_body(raw)
    }

    fn quote(&self) -> Markup {
        match &self.post.quote {
            Some(QuoteContent::Tree(node)) => QuoteBox::new(node, self.ctx).render(),
            Some(QuoteContent::LegacyText(text)) => html! {
                div style=(QUOTE_CONTAINER_STYLE) {
                    div style="color: #14171a; font-size: 14px; line-height: 1.3; white-space: pre-wrap;" { (text) }
                    @if let Some(url) = &self.post.post.quote_url {
                        (view_quoted_link(url))
                    }
                }
            },
            None => match &self.post.post.quote_url {
                Some(url) => QuoteFallback(url).render(),
                None => html! {},
            },
        }
    }
}

impl Render for PostCard<'_> {
    fn render(&self) -> Markup {
        let post = &self.post.post;
        let handle = post.display_handle();
        let time = self.ctx.format_time(post.published);

        html! {
            div style="border: 1px solid #e1e8ed; border-radius: 12px; padding: 16px; margin: 12px 0; background: white;" {
                @if post.is_retweet {
                    div style="color: #657786; font-size: 13px; margin-bottom: 8px;" {
                        "🔁 Retweeted by @" (post.handle)
                    }
                }
                div style="display: flex; align-items: flex-start;" {
                    (Avatar { handle, url: self.ctx.avatar(handle) })
                    div style="flex: 1;" {
                        div style="font-weight: bold; color: #14171a;" { "@" (handle) }
                        div style="color: #657786; font-size: 13px; margin-bottom: 8px;" { (time) }
                        div style="color: #14171a; font-size: 15px; line-height: 1.4; white-space: pre-wrap;" {
                            (PreEscaped(self.body()))
                        }
                        (self.quote())
                        @if !self.post.server_image_urls.is_empty() {
                            div style="margin-top: 12px;" {
                                @for src in &self.post.server_image_urls {
                                    img src=(src) style="max-width: 100%; height: auto; border-radius: 12px; margin: 4px 0; display: block;";
                                }
                            }
                        }
                        div style="margin-top: 12px; padding-top: 8px; border-top: 1px solid #e1e8ed;" {
                            a href=(post.nitter_url) style="color: #1da1f2; text-decoration: none; font-size: 13px; margin-right: 16px;" { "View on Nitter" }
                            a href=(post.x_url) style="color: #1da1f2; text-decoration: none; font-size: 13px;" { "View on X" }
                        }
                    }
                }
            }
        }
    }
}

/// Profile picture, or a coloured initial when none was found.
struct Avatar<'a> {
    handle: &'a str,
    url: Option<&'a str>,
}

impl Render for Avatar<'_> {
    fn render(&self) -> Markup {
        let initial = self
            .handle
            .chars()
            .next()
            .map_or_else(|| "?".to_string(), |c| c.to_uppercase().to_string());
        html! {
            @if let Some(src) = self.url {
                img src=(src) alt=(self.handle) style="width: 48px; height: 48px; border-radius: 50%; margin-right: 12px;";
            } @else {
                div style="width: 48px; height: 48px; border-radius: 50%; background: #1da1f2; margin-right: 12px; \
                           display: flex; align-items: center; justify-content: center; color: white; \
                           font-weight: bold; font-size: 18px;" {
                    (initial)
                }
            }
        }
    }
}

/// Shown when a quoted post's content could not be fetched.
struct QuoteFallback<'a>(&'a str);

impl Render for QuoteFallback<'_> {
    fn render(&self) -> Markup {
        let author = handle_from_status_url(self.0).unwrap_or_else(|| "unknown".to_string());
        html! {
            div style=(QUOTE_CONTAINER_STYLE) {
                div style="color: #657786; font-size: 13px; margin-bottom: 6px;" {
                    (QUOTE_MARKER) " Quoting @" (author)
                }
                (view_quoted_link(self.0))
            }
        }
    }
}

fn view_quoted_link(url: &str) -> Markup {
    html! {
        div style="color: #1da1f2; font-size: 13px;" {
            a href=(url) style=(LINK_STYLE) { "View quoted tweet →" }
        }
    }
}
