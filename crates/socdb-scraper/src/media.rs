//! Best-effort download of post and story media to the local media root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;

use socdb_core::{MediaItem, MediaKind, SocialPost};

use crate::error::ScraperError;

const MAX_ATTEMPTS: u32 = 3;

/// Per-post download tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for DownloadReport {
    fn add_assign(&mut self, rhs: Self) {
        self.downloaded += rhs.downloaded;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// Writes media to `<root>/<platform>/<author>/<post_id>_<n>.<ext>`.
///
/// Files that already exist are skipped, so re-running a job never
/// re-downloads. Each URL gets up to three attempts.
#[derive(Debug, Clone)]
pub struct MediaDownloader {
    client: Client,
    root: PathBuf,
    retry_delay: Duration,
}

impl MediaDownloader {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn new(root: impl Into<PathBuf>, timeout_secs: u64) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            root: root.into(),
            retry_delay: Duration::from_secs(2),
        })
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn target_path(&self, post: &SocialPost, index: usize, item: &MediaItem) -> PathBuf {
        let author = if post.author_username.is_empty() {
            "unknown"
        } else {
            post.author_username.as_str()
        };
        self.root
            .join(post.platform.as_str())
            .join(path_segment(author))
            .join(format!(
                "{}_{index}.{}",
                path_segment(&post.post_id),
                media_extension(item)
            ))
    }

    /// Downloads every media item of `post`. Failures are logged and counted,
    /// never returned.
    pub async fn download_post(&self, post: &SocialPost) -> DownloadReport {
        let mut report = DownloadReport::default();
        for (index, item) in post.media.iter().enumerate() {
            let path = self.target_path(post, index, item);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                report.skipped += 1;
                continue;
            }
            match self.download_with_retry(&item.url, &path).await {
                Ok(()) => report.downloaded += 1,
                Err(e) => {
                    tracing::warn!(
                        platform = %post.platform,
                        post_id = %post.post_id,
                        url = %item.url,
                        error = %e,
                        "media download failed"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn download_with_retry(&self, url: &str, path: &Path) -> Result<(), ScraperError> {
        let mut attempt = 1;
        loop {
            match self.download_once(url, path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= MAX_ATTEMPTS => return Err(e),
                Err(e) => {
                    tracing::debug!(attempt, url, error = %e, "retrying media download");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn download_once(&self, url: &str, path: &Path) -> Result<(), ScraperError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| media_io(dir, e))?;
        }
        // Write then rename so an interrupted download never looks complete.
        let partial = path.with_extension("part");
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(|e| media_io(&partial, e))?;
        tokio::fs::rename(&partial, path)
            .await
            .map_err(|e| media_io(path, e))
    }
}

fn media_io(path: &Path, source: std::io::Error) -> ScraperError {
    ScraperError::MediaIo {
        path: path.display().to_string(),
        source,
    }
}

/// `mp4` for video; for images the format named in the URL, else `jpg`.
#[must_use]
pub fn media_extension(item: &MediaItem) -> &'static str {
    if item.kind == MediaKind::Video {
        return "mp4";
    }
    let url = item.url.to_ascii_lowercase();
    if url.contains(".png") {
        "png"
    } else if url.contains(".gif") {
        "gif"
    } else if url.contains(".webp") {
        "webp"
    } else {
        "jpg"
    }
}

fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socdb_core::Platform;

    fn item(kind: MediaKind, url: &str) -> MediaItem {
        MediaItem {
            kind,
            url: url.to_string(),
            thumbnail_url: None,
        }
    }

    #[test]
    fn extension_follows_kind_and_url() {
        assert_eq!(media_extension(&item(MediaKind::Video, "https://x/a.jpg")), "mp4");
        assert_eq!(media_extension(&item(MediaKind::Image, "https://x/a.PNG?s=1")), "png");
        assert_eq!(media_extension(&item(MediaKind::Image, "https://x/a.webp")), "webp");
        assert_eq!(media_extension(&item(MediaKind::Image, "https://x/a")), "jpg");
        assert_eq!(media_extension(&item(MediaKind::Carousel, "https://x/a.gif")), "gif");
    }

    #[test]
    fn target_path_layout() {
        let downloader = MediaDownloader::new("/media", 5).unwrap();
        let mut post = SocialPost::new(Platform::Instagram, "C4abc", "post");
        post.author_username = "nasa".into();
        let path = downloader.target_path(&post, 2, &item(MediaKind::Video, "https://x/v"));
        assert_eq!(path, PathBuf::from("/media/instagram/nasa/C4abc_2.mp4"));
    }

    #[test]
    fn target_path_neutralises_separators() {
        let downloader = MediaDownloader::new("/media", 5).unwrap();
        let post = SocialPost::new(Platform::Facebook, "a/../b", "post");
        let path = downloader.target_path(&post, 0, &item(MediaKind::Image, "https://x/i"));
        assert_eq!(path, PathBuf::from("/media/facebook/unknown/a_.._b_0.jpg"));
        assert_eq!(path_segment(".."), "_");
    }
}
