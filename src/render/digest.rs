use std::fmt::Write as _;

use maud::{html, Render, DOCTYPE};

use super::post::PostCard;
use super::RenderContext;
use crate::accounts::AccountList;
use crate::models::EnrichedPost;

const RULE_WIDTH: usize = 50;
const SECTION_RULE_WIDTH: usize = 30;

/// Render a list's digest as `(plain text, HTML)`.
///
/// Posts appear oldest first in the HTML. The text version groups posts per
/// account when the list has more than one.
#[must_use]
pub fn render_digest(
    posts: &[EnrichedPost],
    list: &AccountList,
    ctx: &RenderContext,
) -> (String, String) {
    if posts.is_empty() {
        let message = format!("No new posts found for {}.", list.name);
        let html = html! { p { (message) } }.into_string();
        return (message, html);
    }

    let mut ordered: Vec<&EnrichedPost> = posts.iter().collect();
    ordered.sort_by_key(|p| p.post.published);

    (render_text(&ordered, list), render_html(&ordered, list, ctx))
}

fn render_text(posts: &[&EnrichedPost], list: &AccountList) -> String {
    let mut out = format!("{}\n{}\n", list.title(), "=".repeat(RULE_WIDTH));

    if list.is_single() {
        let _ = writeln!(out, "\n{} new posts:", posts.len());
        let _ = writeln!(out, "{}", "-".repeat(SECTION_RULE_WIDTH));
        push_text_entries(&mut out, posts.iter().copied());
    } else {
        // Group in order of first appearance.
        let mut handles: Vec<&str> = Vec::new();
        for post in posts {
            if !handles.contains(&post.post.handle.as_str()) {
                handles.push(&post.post.handle);
            }
        }
        for handle in handles {
            let group: Vec<&EnrichedPost> = posts
                .iter()
                .copied()
                .filter(|p| p.post.handle == handle)
                .collect();
            let _ = writeln!(out, "\n@{handle} ({} posts):", group.len());
            let _ = writeln!(out, "{}", "-".repeat(SECTION_RULE_WIDTH));
            push_text_entries(&mut out, group);
        }
    }
    out
}

fn push_text_entries<'a>(out: &mut String, posts: impl IntoIterator<Item = &'a EnrichedPost>) {
    for enriched in posts {
        let post = &enriched.post;
        if post.is_retweet {
            let _ = writeln!(out, "🔁 Retweeted: {}", post.title);
        } else {
            let _ = writeln!(out, "• {}", post.title);
        }
        let _ = writeln!(out, "  {}\n", post.nitter_url);
    }
}

fn render_html(posts: &[&EnrichedPost], list: &AccountList, ctx: &RenderContext) -> String {
    let title = list.title();
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
            }
            body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; background: #f7f9fa; padding: 20px;" {
                div style="background: white; border-radius: 16px; padding: 24px; box-shadow: 0 1px 3px rgba(0,0,0,0.1);" {
                    h1 style="color: #14171a; margin: 0 0 24px 0; font-size: 24px;" { "📧 " (title) }
                    div style="color: #657786; font-size: 14px; margin-bottom: 24px;" {
                        (posts.len()) " new posts"
                    }
                    @for post in posts {
                        (PostCard::new(post, ctx).render())
                    }
                }
                div style="text-align: center; margin-top: 20px; color: #657786; font-size: 12px;" {
                    "Generated by nitter-digest"
                }
            }
        }
    }
    .into_string()
}
