//! Posts, quote trees and the enrichment stages a post passes through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::nitter::{extract_status_url_from_html, to_x_url, MirrorConfig};

/// One level of a quoted-post chain.
///
/// Serialized as a single nested JSON object; the field names are the
/// persisted wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteNode {
    pub url: String,
    pub author: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// RFC 3339 instant in UTC.
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_attachments: Vec<VideoAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_quote: Option<Box<QuoteNode>>,
}

impl QuoteNode {
    /// Number of levels from this node to the deepest nested quote.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels().count()
    }

    /// This node followed by each nested quote in turn.
    pub fn levels(&self) -> impl Iterator<Item = &QuoteNode> {
        std::iter::successors(Some(self), |node| node.nested_quote.as_deref())
    }

    /// Authors found anywhere in the chain, outermost first.
    #[must_use]
    pub fn authors(&self) -> Vec<&str> {
        self.levels().filter_map(|n| n.author.as_deref()).collect()
    }
}

/// A video attached to a status: a still thumbnail and where clicking it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAttachment {
    pub thumbnail_url: String,
    pub video_url: String,
}

/// Quote data as stored for a post.
///
/// Rows written before quote trees existed hold only the quoted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteContent {
    LegacyText(String),
    Tree(QuoteNode),
}

/// Flat quote columns kept alongside the serialized quote data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyQuoteFields {
    pub url: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub image_urls: Vec<String>,
}

impl QuoteContent {
    /// Encode for the `quote_data` column.
    #[must_use]
    pub fn to_db_string(&self) -> String {
        match self {
            Self::LegacyText(text) => text.clone(),
            Self::Tree(node) => {
                serde_json::to_string(node).unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to serialize quote tree, storing text only");
                    node.text.clone().unwrap_or_default()
                })
            }
        }
    }

    /// Decode a `quote_data` column value. JSON objects become trees; anything
    /// else is legacy text.
    #[must_use]
    pub fn from_db_string(stored: &str) -> Option<Self> {
        if stored.trim().is_empty() {
            return None;
        }
        if stored.starts_with('{') {
            match serde_json::from_str::<QuoteNode>(stored) {
                Ok(node) => return Some(Self::Tree(node)),
                Err(e) => {
                    warn!(error = %e, "Stored quote data looks like JSON but does not parse");
                }
            }
        }
        Some(Self::LegacyText(stored.to_string()))
    }

    #[must_use]
    pub fn tree(&self) -> Option<&QuoteNode> {
        match self {
            Self::Tree(node) => Some(node),
            Self::LegacyText(_) => None,
        }
    }

    /// Flatten the outermost quote into the legacy columns.
    #[must_use]
    pub fn legacy_fields(&self) -> LegacyQuoteFields {
        match self {
            Self::LegacyText(text) => LegacyQuoteFields {
                text: Some(text.clone()),
                ..LegacyQuoteFields::default()
            },
            Self::Tree(node) => LegacyQuoteFields {
                url: Some(node.url.clone()),
                author: node.author.clone(),
                text: node.text.clone(),
                image_urls: node.image_urls.clone(),
            },
        }
    }
}

/// A feed entry as delivered by the feed source, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    /// Account whose feed produced the entry.
    pub handle: String,
    /// Entry author; for reposts this is the original poster.
    pub author: Option<String>,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub published: DateTime<Utc>,
    pub link: String,
    pub image_urls: Vec<String>,
    pub avatar_url: Option<String>,
}

/// One ingested feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub handle: String,
    pub title: String,
    pub summary: String,
    pub raw_description: String,
    pub published: DateTime<Utc>,
    pub nitter_url: String,
    pub x_url: String,
    pub image_urls: Vec<String>,
    pub avatar_url: Option<String>,
    pub is_retweet: bool,
    pub is_reply: bool,
    pub retweet_author: Option<String>,
    pub quote_url: Option<String>,
}

impl Post {
    #[must_use]
    pub fn from_entry(entry: FeedEntry, mirror: &MirrorConfig) -> Self {
        let is_retweet = entry.title.starts_with("RT by @");
        let is_reply = entry.title.starts_with("R to @");
        let retweet_author = if is_retweet {
            entry
                .author
                .as_deref()
                .map(|a| a.trim().trim_start_matches('@').to_string())
                .filter(|a| !a.is_empty())
        } else {
            None
        };
        let quote_url = extract_status_url_from_html(&entry.description)
            .and_then(|link| mirror.normalize(&link));
        let x_url = to_x_url(&entry.link, &mirror.base_url);

        Self {
            id: entry.id,
            handle: entry.handle,
            title: entry.title,
            summary: entry.summary,
            raw_description: entry.description,
            published: entry.published,
            nitter_url: entry.link,
            x_url,
            image_urls: entry.image_urls,
            avatar_url: entry.avatar_url,
            is_retweet,
            is_reply,
            retweet_author,
            quote_url,
        }
    }

    /// Trailing path segment of the id, used to name downloaded files.
    #[must_use]
    pub fn short_id(&self) -> &str {
        let trimmed = self.id.split('#').next().unwrap_or(&self.id);
        trimmed
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(trimmed)
    }

    /// Handle whose avatar and name lead the rendered post.
    #[must_use]
    pub fn display_handle(&self) -> &str {
        if self.is_retweet {
            self.retweet_author.as_deref().unwrap_or("unknown")
        } else {
            &self.handle
        }
    }
}

/// A post together with everything enrichment has attached to it.
///
/// Each stage consumes the previous value and returns the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedPost {
    pub post: Post,
    /// Re-hosted copies of `post.image_urls`.
    pub server_image_urls: Vec<String>,
    pub quote: Option<QuoteContent>,
}

impl EnrichedPost {
    #[must_use]
    pub fn new(post: Post) -> Self {
        Self {
            post,
            server_image_urls: Vec::new(),
            quote: None,
        }
    }

    #[must_use]
    pub fn with_images(self, server_image_urls: Vec<String>) -> Self {
        Self {
            server_image_urls,
            ..self
        }
    }

    #[must_use]
    pub fn with_quote(self, quote: Option<QuoteContent>) -> Self {
        Self { quote, ..self }
    }

    #[must_use]
    pub fn quote_tree(&self) -> Option<&QuoteNode> {
        self.quote.as_ref().and_then(QuoteContent::tree)
    }

    /// Every handle the rendered post will show an avatar for.
    #[must_use]
    pub fn authors(&self) -> Vec<String> {
        let mut authors = vec![self.post.handle.clone()];
        if let Some(author) = &self.post.retweet_author {
            authors.push(author.clone());
        }
        if let Some(tree) = self.quote_tree() {
            authors.extend(tree.authors().into_iter().map(str::to_string));
        }
        authors
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use url::Url;

    use super::*;

    fn sample_tree() -> QuoteNode {
        QuoteNode {
            url: "https://nitter.example.com/quoted/status/456".to_string(),
            author: Some("quoteduser".to_string()),
            text: Some("This is a quoted tweet".to_string()),
            image_urls: vec!["https://example.com/image1.jpg".to_string()],
            published: Some("2025-01-15T22:30:00+00:00".to_string()),
            video_attachments: vec![],
            nested_quote: Some(Box::new(QuoteNode {
                url: "https://nitter.example.com/nested/status/789".to_string(),
                author: Some("nesteduser".to_string()),
                text: Some("This is a nested quote".to_string()),
                image_urls: vec!["https://example.com/nested_image.jpg".to_string()],
                published: None,
                video_attachments: vec![VideoAttachment {
                    thumbnail_url: "https://nitter.example.com/pic/thumb.jpg".to_string(),
                    video_url: "https://nitter.example.com/nested/status/789".to_string(),
                }],
                nested_quote: None,
            })),
        }
    }

    fn mirror() -> MirrorConfig {
        MirrorConfig::new(Url::parse("https://nitter.example.com/").unwrap())
    }

    fn entry(title: &str, description: &str) -> FeedEntry {
        FeedEntry {
            id: "https://nitter.example.com/testuser/status/123#m".to_string(),
            handle: "testuser".to_string(),
            author: Some("@original".to_string()),
            title: title.to_string(),
            summary: description.to_string(),
            description: description.to_string(),
            published: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            link: "https://nitter.example.com/testuser/status/123#m".to_string(),
            image_urls: vec![],
            avatar_url: None,
        }
    }

    #[test]
    fn test_tree_round_trip() {
        let tree = QuoteContent::Tree(sample_tree());
        let stored = tree.to_db_string();
        assert!(stored.starts_with('{'));
        assert_eq!(QuoteContent::from_db_string(&stored), Some(tree));
    }

    #[test]
    fn test_wire_field_names() {
        let value: serde_json::Value =
            serde_json::from_str(&QuoteContent::Tree(sample_tree()).to_db_string()).unwrap();
        assert_eq!(value["url"], "https://nitter.example.com/quoted/status/456");
        assert_eq!(value["author"], "quoteduser");
        assert_eq!(value["nested_quote"]["author"], "nesteduser");
        assert!(value["nested_quote"].get("nested_quote").is_none());
    }

    #[test]
    fn test_reads_minimal_json() {
        let stored = r#"{"url":"https://n.example/a/status/1","author":"a","text":"hi","image_urls":[]}"#;
        let content = QuoteContent::from_db_string(stored).unwrap();
        let tree = content.tree().unwrap();
        assert_eq!(tree.published, None);
        assert_eq!(tree.nested_quote, None);
    }

    #[test]
    fn test_legacy_text() {
        let content = QuoteContent::from_db_string("Plain text quote").unwrap();
        assert_eq!(content, QuoteContent::LegacyText("Plain text quote".to_string()));
        assert_eq!(content.to_db_string(), "Plain text quote");
        assert_eq!(content.legacy_fields().text.as_deref(), Some("Plain text quote"));
        assert_eq!(QuoteContent::from_db_string(""), None);
    }

    #[test]
    fn test_legacy_fields_from_tree() {
        let fields = QuoteContent::Tree(sample_tree()).legacy_fields();
        assert_eq!(
            fields.url.as_deref(),
            Some("https://nitter.example.com/quoted/status/456")
        );
        assert_eq!(fields.author.as_deref(), Some("quoteduser"));
        assert_eq!(fields.text.as_deref(), Some("This is a quoted tweet"));
        assert_eq!(fields.image_urls, vec!["https://example.com/image1.jpg"]);
    }

    #[test]
    fn test_depth_and_authors() {
        let tree = sample_tree();
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.authors(), vec!["quoteduser", "nesteduser"]);
    }

    #[test]
    fn test_post_classification() {
        let rt = Post::from_entry(entry("RT by @testuser: hello", ""), &mirror());
        assert!(rt.is_retweet);
        assert!(!rt.is_reply);
        assert_eq!(rt.retweet_author.as_deref(), Some("original"));
        assert_eq!(rt.display_handle(), "original");

        let reply = Post::from_entry(entry("R to @someone: hi", ""), &mirror());
        assert!(reply.is_reply);
        assert_eq!(reply.retweet_author, None);
        assert_eq!(reply.display_handle(), "testuser");
    }

    #[test]
    fn test_post_quote_link_and_x_url() {
        let description = r#"<p>Wow</p><p><a href="https://nitter.example.com/other/status/99#m">nitter.example.com/other/status/99#m</a></p>"#;
        let post = Post::from_entry(entry("Wow", description), &mirror());
        assert_eq!(
            post.quote_url.as_deref(),
            Some("https://nitter.example.com/other/status/99#m")
        );
        assert_eq!(post.x_url, "https://x.com/testuser/status/123#m");
        assert_eq!(post.short_id(), "123");
    }

    #[test]
    fn test_enrichment_stages() {
        let post = Post::from_entry(entry("hello", ""), &mirror());
        let enriched = EnrichedPost::new(post)
            .with_images(vec!["https://img.example/1.jpg".to_string()])
            .with_quote(Some(QuoteContent::Tree(sample_tree())));
        assert_eq!(enriched.server_image_urls.len(), 1);
        assert_eq!(
            enriched.authors(),
            vec!["testuser", "quoteduser", "nesteduser"]
        );
    }
}
