use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Social-network domains whose status links are rewritten onto the mirror.
const SOCIAL_DOMAINS: &[&str] = &["twitter.com", "x.com"];

/// Canonical public address used for "View on X" links.
const X_BASE: &str = "https://x.com/";

static STATUS_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/status/\d+").expect("valid regex"));

static STATUS_URL_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s"'<>]+?/status/\d+"#).expect("valid regex")
});

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Canonicalize a status-page link onto the mirror.
///
/// Returns `None` for empty input. Links to the social network itself are
/// moved onto `base` with their path kept; other absolute URLs pass through;
/// relative links are joined against `base` when one is given.
#[must_use]
pub fn normalize_status_url(link: &str, base: Option<&Url>) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }

    // Protocol-relative links behave like absolute https links.
    let candidate = if link.starts_with("//") {
        format!("https:{link}")
    } else {
        link.to_string()
    };

    if let Ok(parsed) = Url::parse(&candidate) {
        if parsed.host_str().is_some_and(is_social_host) {
            if let Some(base) = base {
                if let Some(rewritten) = join_onto(base, parsed.path()) {
                    return Some(rewritten);
                }
            }
        }
        return Some(candidate);
    }

    match base {
        Some(base) => Some(join_onto(base, link).unwrap_or_else(|| link.to_string())),
        None => Some(link.to_string()),
    }
}

fn is_social_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    SOCIAL_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// Join `path` onto `base`, treating `base` as a directory whether or not its
/// path carries a trailing slash.
fn join_onto(base: &Url, path: &str) -> Option<String> {
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let with_slash = format!("{}/", dir.path());
        dir.set_path(&with_slash);
    }
    dir.join(path).ok().map(String::from)
}

/// Whether a URL or path names a single status.
#[must_use]
pub fn is_status_url(url: &str) -> bool {
    STATUS_PATH.is_match(url)
}

/// First absolute status URL mentioned in plain text.
#[must_use]
pub fn extract_status_url_from_text(text: &str) -> Option<String> {
    STATUS_URL_IN_TEXT
        .find(text)
        .map(|m| m.as_str().to_string())
}

/// First hyperlink in a markup fragment that points at a status.
#[must_use]
pub fn extract_status_url_from_html(html: &str) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| is_status_url(href))
        .map(str::to_string)
}

/// Compare two status links, ignoring fragments and trailing slashes.
#[must_use]
pub fn same_status(a: &str, b: &str) -> bool {
    fn key(url: &str) -> &str {
        let url = url.split('#').next().unwrap_or(url);
        url.trim_end_matches('/')
    }
    key(a) == key(b)
}

/// The handle segment preceding `/status/` in a status link.
#[must_use]
pub fn handle_from_status_url(url: &str) -> Option<String> {
    let path = Url::parse(url).map_or_else(|_| url.to_string(), |u| u.path().to_string());
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments
        .windows(2)
        .find(|pair| pair[1] == "status")
        .map(|pair| pair[0].to_string())
}

/// Map a mirror link to the equivalent address on the social network.
#[must_use]
pub fn to_x_url(mirror_url: &str, base: &Url) -> String {
    let base_str = base.as_str();
    if let Some(rest) = mirror_url.strip_prefix(base_str) {
        return format!("{X_BASE}{rest}");
    }
    match Url::parse(mirror_url) {
        Ok(parsed) if parsed.host_str() == base.host_str() => {
            format!("{X_BASE}{}", parsed.path().trim_start_matches('/'))
        }
        _ => mirror_url.to_string(),
    }
}
