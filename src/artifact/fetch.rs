use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::Fetcher;

/// Streams a download into `<temp_dir>/<uuid>`.
pub struct HttpFetcher {
    client: reqwest::Client,
    temp_dir: PathBuf,
}

impl HttpFetcher {
    pub fn new(temp_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("mockd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("HTTP client init failed: {}", e))?;
        Ok(Self {
            client,
            temp_dir: temp_dir.into(),
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GET {} failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned {}", url, status);
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", dest.display(), e))?;

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| anyhow::anyhow!("Download of {} interrupted: {}", url, e))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| anyhow::anyhow!("mkdir {} failed: {}", self.temp_dir.display(), e))?;
        let dest = self.temp_dir.join(uuid::Uuid::new_v4().to_string());

        match self.download(url, &dest).await {
            Ok(bytes) => {
                tracing::info!(%url, bytes, path = %dest.display(), "Download complete");
                Ok(dest)
            }
            Err(e) => {
                // Never leave a partial file that could be mistaken for the artifact.
                let _ = tokio::fs::remove_file(&dest).await;
                Err(e)
            }
        }
    }
}
