use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::StoredTweet;
use crate::models::{EnrichedPost, QuoteContent};

/// Whether a post id has never been stored.
pub async fn is_new_post(pool: &SqlitePool, id: &str) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM tweets WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up tweet")?;
    Ok(row.is_none())
}

/// Insert or replace a post together with its quote data.
///
/// The outermost quote is also flattened into the legacy quote columns.
pub async fn save_post(pool: &SqlitePool, enriched: &EnrichedPost) -> Result<()> {
    let post = &enriched.post;
    let legacy = enriched
        .quote
        .as_ref()
        .map(QuoteContent::legacy_fields)
        .unwrap_or_default();
    let quote_url = legacy.url.clone().or_else(|| post.quote_url.clone());
    let quote_data = enriched.quote.as_ref().map(QuoteContent::to_db_string);

    sqlx::query(
        r"
        INSERT OR REPLACE INTO tweets
            (id, handle, title, summary, published, nitter_url, x_url,
             image_urls, server_image_urls, profile_pic_url, raw_description,
             is_retweet, is_reply, retweet_author,
             quote_tweet_url, quote_author, quote_text, quote_image_urls, quote_data,
             included_in_newsletter)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
        ",
    )
    .bind(&post.id)
    .bind(&post.handle)
    .bind(&post.title)
    .bind(&post.summary)
    .bind(post.published.to_rfc3339())
    .bind(&post.nitter_url)
    .bind(&post.x_url)
    .bind(serde_json::to_string(&post.image_urls)?)
    .bind(serde_json::to_string(&enriched.server_image_urls)?)
    .bind(&post.avatar_url)
    .bind(&post.raw_description)
    .bind(post.is_retweet)
    .bind(post.is_reply)
    .bind(&post.retweet_author)
    .bind(quote_url)
    .bind(&legacy.author)
    .bind(&legacy.text)
    .bind(serde_json::to_string(&legacy.image_urls)?)
    .bind(quote_data)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to save tweet {}", post.id))?;

    Ok(())
}

/// Get a stored tweet by id.
pub async fn get_tweet(pool: &SqlitePool, id: &str) -> Result<Option<StoredTweet>> {
    sqlx::query_as("SELECT * FROM tweets WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch tweet")
}

/// Load a post's quote data.
///
/// Rows written before `quote_data` existed fall back to the legacy quote
/// text column.
pub async fn load_quote_content(pool: &SqlitePool, id: &str) -> Result<Option<QuoteContent>> {
    let row: Option<(Option<String>, Option<String>)> =
        sqlx::query_as("SELECT quote_data, quote_text FROM tweets WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to load quote data")?;

    Ok(row.and_then(|(data, text)| {
        data.as_deref()
            .and_then(QuoteContent::from_db_string)
            .or_else(|| text.filter(|t| !t.trim().is_empty()).map(QuoteContent::LegacyText))
    }))
}
