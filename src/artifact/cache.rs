use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::ArtifactCache;

/// Directory-backed tool cache, laid out like the Actions runner tool cache:
///
/// ```text
/// <root>/<name>/<version>/<arch>/<file>
/// <root>/<name>/<version>/<arch>.complete
/// ```
///
/// An entry only counts as present once its `.complete` marker exists.
#[derive(Debug, Clone)]
pub struct ToolCacheDir {
    root: PathBuf,
    arch: String,
}

impl ToolCacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            arch: runner_arch().to_string(),
        }
    }

    fn version_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(name).join(version)
    }

    fn entry_dir(&self, name: &str, version: &str) -> PathBuf {
        self.version_dir(name, version).join(&self.arch)
    }

    fn marker(&self, name: &str, version: &str) -> PathBuf {
        self.version_dir(name, version)
            .join(format!("{}.complete", self.arch))
    }
}

fn runner_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "x86",
        other => other,
    }
}

#[async_trait]
impl ArtifactCache for ToolCacheDir {
    async fn find(&self, name: &str, version: &str) -> anyhow::Result<Option<PathBuf>> {
        let dir = self.entry_dir(name, version);
        let marker = self.marker(name, version);
        let complete = tokio::fs::try_exists(&marker).await.unwrap_or(false);
        if complete && dir.is_dir() {
            tracing::debug!(path = %dir.display(), "Tool cache hit");
            Ok(Some(dir))
        } else {
            tracing::debug!(%name, %version, "Tool cache miss");
            Ok(None)
        }
    }

    async fn cache_file(
        &self,
        source: &Path,
        file_name: &str,
        name: &str,
        version: &str,
    ) -> anyhow::Result<PathBuf> {
        let dir = self.entry_dir(name, version);
        let marker = self.marker(name, version);

        // Start from a clean entry; a previous interrupted insert may have left files behind.
        let _ = tokio::fs::remove_file(&marker).await;
        crate::native::file::empty_dir(&dir).await?;

        let target = dir.join(file_name);
        if tokio::fs::rename(source, &target).await.is_err() {
            // Cross-device: fall back to copy + remove.
            tokio::fs::copy(source, &target).await.map_err(|e| {
                anyhow::anyhow!("Copy {} -> {} failed: {}", source.display(), target.display(), e)
            })?;
            let _ = tokio::fs::remove_file(source).await;
        }

        tokio::fs::write(&marker, b"")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", marker.display(), e))?;

        Ok(dir)
    }
}
