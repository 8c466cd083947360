use maud::{html, Markup, Render};

use super::RenderContext;
use crate::constants::QUOTE_MARKER;
use crate::models::{QuoteNode, VideoAttachment};

/// Extra left indent per nesting level, in pixels.
const INDENT_STEP_PX: usize = 16;
const BASE_FONT_PX: usize = 14;
const MIN_FONT_PX: usize = 11;
const BASE_AVATAR_PX: usize = 32;
const AVATAR_STEP_PX: usize = 4;
const MIN_AVATAR_PX: usize = 20;

/// One quoted post, with any quote it contains rendered inside it.
#[derive(Debug, Clone, Copy)]
pub struct QuoteBox<'a> {
    pub node: &'a QuoteNode,
    pub depth: usize,
    pub ctx: &'a RenderContext,
}

impl<'a> QuoteBox<'a> {
    #[must_use]
    pub const fn new(node: &'a QuoteNode, ctx: &'a RenderContext) -> Self {
        Self {
            node,
            depth: 0,
            ctx,
        }
    }

    #[must_use]
    pub const fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    fn font_px(&self) -> usize {
        BASE_FONT_PX.saturating_sub(self.depth).max(MIN_FONT_PX)
    }

    fn avatar_px(&self) -> usize {
        BASE_AVATAR_PX
            .saturating_sub(AVATAR_STEP_PX * self.depth)
            .max(MIN_AVATAR_PX)
    }
}

impl Render for QuoteBox<'_> {
    fn render(&self) -> Markup {
        let node = self.node;
        let font = self.font_px();
        let avatar = self.avatar_px();
        let container_style = format!(
            "border: 1px solid #e1e8ed; border-radius: 12px; padding: 12px; \
             margin: 8px 0 8px {}px; background: #f7f9fa;",
            INDENT_STEP_PX * self.depth
        );
        let author = node.author.as_deref().map_or_else(
            || "Unknown".to_string(),
            |a| format!("@{}", a.trim_start_matches('@')),
        );
        let avatar_url = node.author.as_deref().and_then(|a| self.ctx.avatar(a));
        let timestamp = node
            .published
            .as_deref()
            .and_then(|ts| self.ctx.format_stored_time(ts));

        html! {
            div style=(container_style) {
                div style="display: flex; align-items: center; margin-bottom: 8px;" {
                    @if let Some(src) = avatar_url {
                        img src=(src) alt=(author)
                            style=(format!("width: {avatar}px; height: {avatar}px; border-radius: 50%; margin-right: 8px;"));
                    }
                    div {
                        div style="color: #657786; font-size: 13px; font-weight: bold;" {
                            (QUOTE_MARKER) " " (author)
                        }
                        @if let Some(timestamp) = timestamp {
                            div style="color: #657786; font-size: 12px;" { (timestamp) }
                        }
                    }
                }
                @if let Some(text) = node.text.as_deref() {
                    div style=(format!("color: #14171a; font-size: {font}px; line-height: 1.3; margin-bottom: 8px; white-space: pre-wrap;")) {
                        (text)
                    }
                }
                @if !node.image_urls.is_empty() {
                    div style="margin-top: 8px;" {
                        @for src in &node.image_urls {
                            img src=(src) style="max-width: 100%; height: auto; border-radius: 8px; margin: 2px 0; display: block;";
                        }
                    }
                }
                @for video in &node.video_attachments {
                    (VideoThumb(video))
                }
                @if let Some(nested) = node.nested_quote.as_deref() {
                    (QuoteBox { node: nested, depth: self.depth + 1, ctx: self.ctx })
                }
                div style="color: #1da1f2; font-size: 12px; margin-top: 8px;" {
                    a href=(node.url) style="color: #1da1f2; text-decoration: none;" { "View original →" }
                }
            }
        }
    }
}

/// A video shown as its thumbnail with a play marker on top.
struct VideoThumb<'a>(&'a VideoAttachment);

impl Render for VideoThumb<'_> {
    fn render(&self) -> Markup {
        html! {
            a href=(self.0.video_url) style="position: relative; display: inline-block; margin-top: 8px;" {
                img src=(self.0.thumbnail_url) alt="Video" style="max-width: 100%; height: auto; border-radius: 8px; display: block;";
                span style="position: absolute; top: 50%; left: 50%; transform: translate(-50%, -50%); \
                            background: rgba(0,0,0,0.6); color: white; border-radius: 50%; width: 48px; \
                            height: 48px; line-height: 48px; text-align: center; font-size: 24px;" {
                    "▶"
                }
            }
        }
    }
}

/// Render a quote tree starting at `depth`. `None` renders as an empty string.
#[must_use]
pub fn render_quote_html(node: Option<&QuoteNode>, depth: usize, ctx: &RenderContext) -> String {
    node.map(|node| QuoteBox::new(node, ctx).at_depth(depth).render().into_string())
        .unwrap_or_default()
}
