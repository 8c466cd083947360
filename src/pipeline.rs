//! One run: for each account list, fetch feeds, enrich new posts, render and
//! deliver the digest.
//!
//! Everything runs sequentially. Failures for one account or post are
//! logged and skipped; they never abort the rest of the run.

use std::collections::{BTreeSet, HashMap};

use anyhow::{bail, Context, Result};
use chrono::Local;
use tracing::{debug, info, warn};

use crate::accounts::AccountList;
use crate::config::Config;
use crate::db::{self, Database};
use crate::feed::{FeedPoller, FeedWindow};
use crate::mailer::Mailer;
use crate::media::{ImageServer, MediaStore};
use crate::models::{EnrichedPost, Post, QuoteContent};
use crate::nitter::{polite_pause, QuoteResolver, StatusFetcher};
use crate::render::{render_digest, RenderContext};

/// Switches taken from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Render and print digests instead of mailing them.
    pub dry_run: bool,
    /// Treat every post as new and store nothing.
    pub no_db: bool,
}

/// A rendered digest for one account list.
#[derive(Debug, Clone)]
pub struct Digest {
    pub list_name: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub posts: Vec<EnrichedPost>,
}

pub struct Pipeline {
    config: Config,
    options: RunOptions,
    fetcher: StatusFetcher,
    poller: FeedPoller,
    media: MediaStore,
    db: Option<Database>,
    mailer: Option<Mailer>,
}

impl Pipeline {
    /// Set up clients, the database and the mailer.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be built, the database cannot be
    /// opened, or mail settings are missing for a real run.
    pub async fn new(config: Config, options: RunOptions) -> Result<Self> {
        let mailer = match (&config.smtp, options.dry_run) {
            (Some(smtp), _) => Some(Mailer::new(smtp.clone())),
            (None, true) => None,
            (None, false) => bail!("SMTP settings are required unless running with --dry-run"),
        };

        let db = if options.no_db {
            None
        } else {
            Some(
                Database::new(&config.database_path)
                    .await
                    .context("Failed to initialize database")?,
            )
        };

        let fetcher = StatusFetcher::new(config.mirror.clone(), config.fetch_timeout)?;
        let poller = FeedPoller::new(config.mirror.clone(), config.fetch_timeout)?
            .with_page_pause(config.politeness_delay);
        let media = MediaStore::new(
            config.image_dir.clone(),
            ImageServer::from_config(&config),
            config.fetch_timeout,
        )?;
        if !media.rehosting() {
            info!("No image server configured; digests will link images at their source");
        }

        Ok(Self {
            config,
            options,
            fetcher,
            poller,
            media,
            db,
            mailer,
        })
    }

    /// Process every list, returning the digests that had posts.
    pub async fn run(&self, lists: &[AccountList]) -> Vec<Digest> {
        info!(lists = lists.len(), "Processing account lists");
        let mut digests = Vec::new();

        for list in lists {
            let digest = match self.build_digest(list).await {
                Ok(Some(digest)) => digest,
                Ok(None) => {
                    info!(list = %list.name, "No new posts");
                    continue;
                }
                Err(e) => {
                    warn!(list = %list.name, "Failed to build digest: {e:#}");
                    continue;
                }
            };

            if let Err(e) = self.deliver(&digest).await {
                warn!(list = %list.name, "Failed to deliver digest: {e:#}");
            }
            digests.push(digest);
        }

        digests
    }

    /// Fetch, enrich, store and render one list. `None` when nothing is new.
    ///
    /// # Errors
    ///
    /// Returns an error if posts cannot be stored.
    pub async fn build_digest(&self, list: &AccountList) -> Result<Option<Digest>> {
        let limit = list.limit(self.config.max_per_account);
        let mut enriched = Vec::new();

        for (i, handle) in list.accounts.iter().enumerate() {
            if i > 0 {
                polite_pause(self.config.politeness_delay).await;
            }
            let posts = match self.new_posts(handle, limit).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(handle = %handle, "Skipping account: {e:#}");
                    continue;
                }
            };
            info!(handle = %handle, new_posts = posts.len(), "Collected new posts");
            for post in posts {
                enriched.push(self.enrich(post).await);
            }
        }

        if enriched.is_empty() {
            return Ok(None);
        }

        let avatars = self.collect_avatars(&enriched).await;

        if let Some(db) = &self.db {
            for post in &enriched {
                db::save_post(db.pool(), post).await?;
            }
            debug!(count = enriched.len(), "Saved posts");
        }

        let ctx = RenderContext::new(self.config.display_timezone).with_avatars(avatars);
        let (text, html) = render_digest(&enriched, list, &ctx);

        Ok(Some(Digest {
            list_name: list.name.clone(),
            subject: list.email_subject(Local::now().date_naive()),
            text,
            html,
            posts: enriched,
        }))
    }

    async fn new_posts(&self, handle: &str, limit: usize) -> Result<Vec<Post>> {
        let window = FeedWindow::last_hours(self.config.window_hours, limit);
        let entries = self.poller.fetch_account(handle, &window).await?;

        let mut posts = Vec::with_capacity(entries.len());
        for entry in entries {
            let post = Post::from_entry(entry, &self.config.mirror);
            let is_new = match &self.db {
                Some(db) => db::is_new_post(db.pool(), &post.id).await?,
                None => true,
            };
            if is_new {
                posts.push(post);
            }
        }
        posts.truncate(limit);
        Ok(posts)
    }

    async fn enrich(&self, post: Post) -> EnrichedPost {
        let stem = format!("{}_{}", post.handle, post.short_id());
        let images = if post.image_urls.is_empty() {
            Vec::new()
        } else {
            self.media.store_images(&post.image_urls, &stem).await
        };

        let quote = match post.quote_url.as_deref() {
            Some(url) => {
                debug!(id = %post.id, quote = %url, "Resolving quote chain");
                let tree = QuoteResolver::new(&self.fetcher, self.fetcher.mirror())
                    .with_pause(self.config.politeness_delay)
                    .resolve(url)
                    .await;
                polite_pause(self.config.politeness_delay).await;
                match tree {
                    Some(tree) => Some(QuoteContent::Tree(
                        self.media.rehost_quote_images(tree, &stem).await,
                    )),
                    None => {
                        warn!(id = %post.id, quote = %url, "Quoted post could not be resolved");
                        None
                    }
                }
            }
            None => None,
        };

        EnrichedPost::new(post).with_images(images).with_quote(quote)
    }

    /// Avatar URLs for every author shown in the digest.
    async fn collect_avatars(&self, posts: &[EnrichedPost]) -> HashMap<String, String> {
        let authors: BTreeSet<String> = posts.iter().flat_map(EnrichedPost::authors).collect();
        info!(authors = authors.len(), "Fetching avatars");

        let mut avatars = HashMap::new();
        for (i, author) in authors.into_iter().enumerate() {
            if i > 0 {
                polite_pause(self.config.politeness_delay).await;
            }
            let known = posts
                .iter()
                .find(|p| p.post.handle == author)
                .and_then(|p| p.post.avatar_url.clone());
            let source = match known {
                Some(url) => Some(url),
                None => self.fetcher.fetch_avatar_url(&author).await,
            };
            let Some(source) = source else {
                debug!(handle = %author, "No avatar available");
                continue;
            };
            if let Some(stored) = self.media.store_avatar(&author, &source).await {
                avatars.insert(author, stored);
            }
        }
        avatars
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        if self.options.dry_run {
            println!("{}", "=".repeat(60));
            println!("DRY RUN - {}", digest.list_name);
            println!("Subject: {}", digest.subject);
            println!("Posts: {}", digest.posts.len());
            println!("{}", "-".repeat(30));
            println!("{}", digest.text);
            return Ok(());
        }

        let Some(mailer) = &self.mailer else {
            bail!("No mailer configured");
        };
        mailer.send(&digest.subject, &digest.text, &digest.html).await
    }
}
