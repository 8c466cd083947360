//! Image downloads and re-hosting on a self-hosted static image server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::constants::FETCH_USER_AGENT;
use crate::models::QuoteNode;

const DEFAULT_EXTENSION: &str = ".jpg";

/// A directory served over HTTP. Files copied in become public URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageServer {
    root: PathBuf,
    base_url: String,
}

impl ImageServer {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The configured server, if both its path and URL are set.
    #[must_use]
    pub fn from_config(config: &Config) -> Option<Self> {
        match (&config.image_server_path, &config.image_server_url) {
            (Some(root), Some(url)) => Some(Self::new(root.clone(), url)),
            _ => None,
        }
    }

    /// Copy a local file under `<root>/<date>/` and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be copied.
    pub async fn publish(&self, local: &Path, date: NaiveDate) -> Result<String> {
        let Some(name) = local.file_name().and_then(|n| n.to_str()) else {
            bail!("Not a file path: {}", local.display());
        };
        let name = web_safe_file_name(name);
        let folder = date.format("%Y-%m-%d").to_string();
        let dest_dir = self.root.join(&folder);

        tokio::fs::create_dir_all(&dest_dir)
            .await
            .with_context(|| format!("Failed to create {}", dest_dir.display()))?;
        tokio::fs::copy(local, dest_dir.join(&name))
            .await
            .with_context(|| format!("Failed to copy {} to image server", local.display()))?;

        Ok(format!("{}/{folder}/{name}", self.base_url))
    }
}

/// Downloads images into a dated local directory and re-hosts them.
///
/// Without an [`ImageServer`], images are still downloaded but the digest
/// links the source URLs.
#[derive(Debug, Clone)]
pub struct MediaStore {
    client: Client,
    image_dir: PathBuf,
    server: Option<ImageServer>,
    date: NaiveDate,
    run_stamp: String,
}

impl MediaStore {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(image_dir: impl Into<PathBuf>, server: Option<ImageServer>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(FETCH_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        let now = Utc::now();
        Ok(Self {
            client,
            image_dir: image_dir.into(),
            server,
            date: now.date_naive(),
            run_stamp: now.format("%Y%m%d_%H%M%S").to_string(),
        })
    }

    /// Use a fixed date for folder names.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    #[must_use]
    pub const fn rehosting(&self) -> bool {
        self.server.is_some()
    }

    /// Download and re-host a list of images, naming files `<stem>_<n><ext>`.
    ///
    /// Images that fail are dropped from the result.
    pub async fn store_images(&self, urls: &[String], stem: &str) -> Vec<String> {
        let mut stored = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            if let Some(public) = self.store_image(url, &format!("{stem}_{}", i + 1)).await {
                stored.push(public);
            }
        }
        stored
    }

    /// Download one image and return the URL the digest should use for it.
    pub async fn store_image(&self, url: &str, file_stem: &str) -> Option<String> {
        let local = match self.download(url, file_stem).await {
            Ok(path) => path,
            Err(e) => {
                warn!(url = %url, "Image download failed: {e:#}");
                return None;
            }
        };

        let Some(server) = &self.server else {
            return Some(url.to_string());
        };
        match server.publish(&local, self.date).await {
            Ok(public) => {
                debug!(url = %url, public = %public, "Re-hosted image");
                Some(public)
            }
            Err(e) => {
                warn!(path = %local.display(), "Image re-hosting failed: {e:#}");
                None
            }
        }
    }

    /// Re-host every image and video thumbnail in a quote tree.
    ///
    /// Images that fail are dropped; a video keeps its original thumbnail.
    pub async fn rehost_quote_images(&self, mut node: QuoteNode, stem: &str) -> QuoteNode {
        let mut level = Some(&mut node);
        let mut depth = 0;
        while let Some(current) = level {
            let level_stem = format!("{stem}_quote{depth}");
            current.image_urls = self.store_images(&current.image_urls, &level_stem).await;
            for (i, video) in current.video_attachments.iter_mut().enumerate() {
                let thumb_stem = format!("{level_stem}_video{}", i + 1);
                if let Some(public) = self.store_image(&video.thumbnail_url, &thumb_stem).await {
                    video.thumbnail_url = public;
                }
            }
            level = current.nested_quote.as_deref_mut();
            depth += 1;
        }
        node
    }

    /// Download and re-host an account's avatar.
    pub async fn store_avatar(&self, handle: &str, url: &str) -> Option<String> {
        let stem = format!("{handle}_profile_{}", self.run_stamp);
        let stored = self.store_image(url, &stem).await;
        if stored.is_some() {
            info!(handle = %handle, "Stored avatar");
        }
        stored
    }

    async fn download(&self, url: &str, file_stem: &str) -> Result<PathBuf> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;
        if !response.status().is_success() {
            bail!("HTTP {}", response.status());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.context("Failed to read image body")?;

        let dir = self.image_dir.join(self.date.format("%Y-%m-%d").to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let ext = image_extension(url, content_type.as_deref());
        let path = dir.join(format!("{file_stem}{ext}"));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// File extension (with dot) for an image, from its URL path, then its
/// content type, defaulting to `.jpg`.
#[must_use]
pub fn image_extension(url: &str, content_type: Option<&str>) -> String {
    let path = Url::parse(url).map_or_else(|_| url.to_string(), |u| u.path().to_string());
    let file = path.rsplit(['/', '\\']).next().unwrap_or_default();
    // Mirror paths percent-encode the original path, so decode a trailing segment too.
    let file = file.rsplit("%2F").next().unwrap_or(file);
    if let Some((_, ext)) = file.rsplit_once('.') {
        let ext = ext.to_ascii_lowercase();
        let is_image = mime_guess::from_ext(&ext)
            .first()
            .is_some_and(|m| m.type_().as_str() == "image");
        if is_image {
            return format!(".{ext}");
        }
    }

    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    let ext = if content_type.contains("jpeg") {
        ".jpg"
    } else if content_type.contains("png") {
        ".png"
    } else if content_type.contains("gif") {
        ".gif"
    } else if content_type.contains("webp") {
        ".webp"
    } else {
        DEFAULT_EXTENSION
    };
    ext.to_string()
}

/// Replace characters that would break a URL path segment.
#[must_use]
pub fn web_safe_file_name(name: &str) -> String {
    name.replace(['#', '?', '&'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_path() {
        assert_eq!(image_extension("https://n.example/pic/media/abc.png", None), ".png");
        assert_eq!(
            image_extension("https://n.example/pic/media%2FGx1.JPG?name=small", Some("image/webp")),
            ".jpg"
        );
    }

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(
            image_extension("https://n.example/pic/media/abc", Some("image/png")),
            ".png"
        );
        assert_eq!(
            image_extension("https://n.example/pic/file.html", Some("image/gif")),
            ".gif"
        );
        assert_eq!(image_extension("https://n.example/pic/abc", None), ".jpg");
        assert_eq!(
            image_extension("https://n.example/pic/abc", Some("application/octet-stream")),
            ".jpg"
        );
    }

    #[test]
    fn test_web_safe_file_name() {
        assert_eq!(web_safe_file_name("a#b?c&d.jpg"), "a_b_c_d.jpg");
        assert_eq!(web_safe_file_name("plain.png"), "plain.png");
    }

    #[test]
    fn test_server_from_config() {
        assert_eq!(ImageServer::from_config(&Config::for_testing()), None);
        let config = Config {
            image_server_path: Some(PathBuf::from("/srv/img")),
            image_server_url: Some("https://img.example/".to_string()),
            ..Config::for_testing()
        };
        assert_eq!(
            ImageServer::from_config(&config),
            Some(ImageServer::new("/srv/img", "https://img.example"))
        );
    }
}
