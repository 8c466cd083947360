/// A row of the `tweets` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredTweet {
    pub id: String,
    pub handle: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published: String,
    pub nitter_url: Option<String>,
    pub x_url: Option<String>,
    /// JSON array.
    pub image_urls: Option<String>,
    /// JSON array.
    pub server_image_urls: Option<String>,
    pub profile_pic_url: Option<String>,
    pub raw_description: Option<String>,
    pub is_retweet: bool,
    pub is_reply: bool,
    pub retweet_author: Option<String>,
    pub quote_tweet_url: Option<String>,
    pub quote_author: Option<String>,
    pub quote_text: Option<String>,
    /// JSON array.
    pub quote_image_urls: Option<String>,
    pub quote_data: Option<String>,
    pub first_seen: String,
    pub included_in_newsletter: bool,
}
