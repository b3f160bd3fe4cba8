// Artifact Provisioner.
//
// Resolves a versioned server artifact to a local path, cache first:
//   hit  -> cached path, no network
//   miss -> fetch once, insert into the cache under (name, version), return cached path
// Fetch failures surface immediately as Acquisition errors; retrying here could
// turn a corrupt partial download into a bad cache entry.

pub mod cache;
pub mod fetch;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::ArtifactConfig;
use crate::error::LaunchError;

pub use cache::ToolCacheDir;
pub use fetch::HttpFetcher;

/// A resolved artifact. Immutable once returned by [`Provisioner::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

/// Versioned tool cache keyed by exact (name, version).
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Directory holding the cached artifact, if present.
    async fn find(&self, name: &str, version: &str) -> anyhow::Result<Option<PathBuf>>;

    /// Move `source` into the cache as `file_name` and return the entry's directory.
    async fn cache_file(
        &self,
        source: &Path,
        file_name: &str,
        name: &str,
        version: &str,
    ) -> anyhow::Result<PathBuf>;
}

/// Downloads a URL to a temporary file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<PathBuf>;
}

pub struct Provisioner<'a> {
    config: &'a ArtifactConfig,
    cache: &'a dyn ArtifactCache,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a ArtifactConfig,
        cache: &'a dyn ArtifactCache,
        fetcher: &'a dyn Fetcher,
    ) -> Self {
        Self {
            config,
            cache,
            fetcher,
        }
    }

    pub async fn resolve(&self, name: &str, version: &str) -> Result<ArtifactReference, LaunchError> {
        let acquisition = |source: anyhow::Error| LaunchError::Acquisition {
            name: name.to_string(),
            version: version.to_string(),
            source,
        };

        let url = self.config.download_url(name, version);
        let file_name = artifact_file_name(&url).map_err(acquisition)?;

        if let Some(dir) = self.cache.find(name, version).await.map_err(acquisition)? {
            let path = dir.join(&file_name);
            tracing::info!(%name, %version, path = %path.display(), "Artifact found in tool cache");
            return Ok(ArtifactReference {
                name: name.to_string(),
                version: version.to_string(),
                path,
            });
        }

        tracing::info!(%name, %version, %url, "Artifact not cached, downloading");
        let downloaded = self.fetcher.fetch(&url).await.map_err(acquisition)?;
        let dir = self
            .cache
            .cache_file(&downloaded, &file_name, name, version)
            .await
            .map_err(acquisition)?;

        let path = dir.join(&file_name);
        tracing::info!(%name, %version, path = %path.display(), "Artifact cached");
        Ok(ArtifactReference {
            name: name.to_string(),
            version: version.to_string(),
            path,
        })
    }
}

/// Last path segment of the download URL, ignoring query and fragment.
fn artifact_file_name(url: &str) -> anyhow::Result<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or("");
    if segment.is_empty() || path.ends_with("//") || !path.contains("://") {
        anyhow::bail!("Cannot derive artifact file name from URL: {}", url);
    }
    Ok(segment.to_string())
}
