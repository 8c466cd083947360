//! Turns scraped post-body markup into markup that is safe to embed in the
//! digest.
//!
//! The output contains plain text, line breaks and hyperlinks whose visible
//! text is always the full destination. Every other element is unwrapped.

use std::sync::LazyLock;

use maud::{html, PreEscaped, Render};
use scraper::{ElementRef, Html, Node, Selector};

/// Inline style given to every retained link.
pub const LINK_STYLE: &str = "color: #1da1f2; text-decoration: none;";

/// Prefixes of the platform's link shortener. Links displayed this way hide
/// their destination.
const SHORTENER_PREFIXES: &[&str] = &["https://t.co/", "http://t.co/", "t.co/"];

/// Elements that become a line break after their content.
const BREAKING_BLOCKS: &[&str] = &["p", "div", "blockquote", "li"];

/// Elements unwrapped without adding a break of their own.
const LISTS: &[&str] = &["ul", "ol"];

static QUOTED_CONTENT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("blockquote, .quote, .quote-big").expect("Invalid selector")
});

/// Sanitize a post body. Empty input yields an empty string.
///
/// Quoted-post previews are *not* removed here; use [`format_tweet_body`]
/// for raw feed markup.
#[must_use]
pub fn sanitize_html(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(raw);
    let mut out = String::with_capacity(raw.len());
    emit_children(fragment.root_element(), &mut out);
    out.trim().to_string()
}

/// Remove embedded quote previews (`blockquote` and quote blocks) along with
/// everything inside them.
#[must_use]
pub fn strip_quoted_content(raw: &str) -> String {
    let mut fragment = Html::parse_fragment(raw);
    let ids: Vec<_> = fragment.select(&QUOTED_CONTENT).map(|e| e.id()).collect();
    if ids.is_empty() {
        return raw.to_string();
    }
    for id in ids {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }
    fragment.root_element().inner_html()
}

/// Prepare a feed entry's body for the digest: drop quoted duplicates, then
/// sanitize what is left.
#[must_use]
pub fn format_tweet_body(raw: &str) -> String {
    sanitize_html(&strip_quoted_content(raw))
}

fn emit_children(parent: ElementRef<'_>, out: &mut String) {
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => {
                let text: &str = text;
                if text.trim().is_empty() {
                    // Whitespace next to block structure or at the edge of its
                    // parent is layout, not content.
                    let prev = child.prev_sibling();
                    let next = child.next_sibling();
                    if prev.is_none()
                        || next.is_none()
                        || breaks_line(prev.and_then(ElementRef::wrap))
                        || breaks_line(next.and_then(ElementRef::wrap))
                    {
                        continue;
                    }
                }
                out.push_str(&text.render().into_string());
            }
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    emit_element(element, out);
                }
            }
            _ => {}
        }
    }
}

fn emit_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    match name {
        "a" => emit_link(element, out),
        "br" => out.push('\n'),
        _ if BREAKING_BLOCKS.contains(&name) => {
            emit_children(element, out);
            out.push('\n');
        }
        _ if LISTS.contains(&name) => emit_children(element, out),
        "script" | "style" => {}
        _ => emit_children(element, out),
    }
}

fn emit_link(element: ElementRef<'_>, out: &mut String) {
    let Some(href) = element
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|h| !h.is_empty())
    else {
        emit_children(element, out);
        return;
    };

    let visible: String = element.text().collect();
    let link = if hides_destination(&visible) {
        html! { a href=(href) style=(LINK_STYLE) { (href) } }
    } else {
        let mut inner = String::new();
        emit_children(element, &mut inner);
        html! { a href=(href) style=(LINK_STYLE) { (PreEscaped(inner)) } }
    };
    out.push_str(&link.into_string());
}

/// Link text that is empty, truncated or shortened.
fn hides_destination(visible: &str) -> bool {
    let visible = visible.trim();
    visible.is_empty()
        || visible.contains("...")
        || visible.contains('\u{2026}')
        || SHORTENER_PREFIXES.iter().any(|p| visible.starts_with(p))
}

fn breaks_line(sibling: Option<ElementRef<'_>>) -> bool {
    sibling.is_some_and(|e| {
        let name = e.value().name();
        name == "br" || BREAKING_BLOCKS.contains(&name) || LISTS.contains(&name)
    })
}
