//! Transport for archives, signatures and listing pages.

use crate::config::FetchConfig;
use crate::errors::{BuildError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Protocol for fetching remote resources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads `url` to `dest`. A partial transfer never appears at `dest`.
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<()>;

    /// Fetches `url` as text.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// `reqwest`-backed fetcher. Also accepts `file://` URLs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher from the HTTP settings.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str, part: &Path) -> Result<()> {
        if let Some(local) = url.strip_prefix("file://") {
            tokio::fs::copy(local, part)
                .await
                .map_err(|e| BuildError::download(url, e))?;
            return Ok(());
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BuildError::download(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BuildError::download(url, format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(part).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BuildError::download(url, e))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(url, dest = %dest.display(), "Fetching");
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(dest);
        match self.download(url, &part).await {
            Ok(()) => {
                tokio::fs::rename(&part, dest).await?;
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        if let Some(local) = url.strip_prefix("file://") {
            return tokio::fs::read_to_string(local)
                .await
                .map_err(|e| BuildError::download(url, e));
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BuildError::download(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BuildError::download(url, format!("HTTP {status}")));
        }
        response.text().await.map_err(|e| BuildError::download(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetchConfig::default()).unwrap()
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/d/zlib-1.3.tar.gz")),
            PathBuf::from("/d/zlib-1.3.tar.gz.part")
        );
    }

    #[tokio::test]
    async fn test_file_url_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("origin.tar.gz");
        std::fs::write(&src, b"payload").unwrap();
        let dest = tmp.path().join("cache").join("origin.tar.gz");

        fetcher()
            .fetch_to(&format!("file://{}", src.display()), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_missing_file_url_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("missing.tar.gz");
        let url = format!("file://{}", tmp.path().join("nope").display());

        let err = fetcher().fetch_to(&url, &dest).await.unwrap_err();
        assert!(matches!(err, BuildError::Download { .. }));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_file_url_text() {
        let tmp = tempfile::tempdir().unwrap();
        let page = tmp.path().join("index.html");
        std::fs::write(&page, "<a href=\"x\">x</a>").unwrap();
        let text = fetcher()
            .fetch_text(&format!("file://{}", page.display()))
            .await
            .unwrap();
        assert!(text.contains("href"));
    }
}
