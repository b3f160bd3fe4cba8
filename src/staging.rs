// Stub Stager.
//
// Copies user mappings and fixture files into the layout WireMock reads from its
// --root-dir, then overlays the synthetic ping mapping. Destinations hang off the
// configured working directory, never off the artifact's cache location.

use std::path::{Path, PathBuf};

use crate::error::LaunchError;
use crate::native::file::{copy_dir_recursive, empty_dir};

pub const MAPPINGS_DIR: &str = "mappings";
pub const FILES_DIR: &str = "__files";

/// Reserved name for the health-check mapping. Written last, so it wins any collision.
pub const PING_MAPPING_FILE: &str = "__mockd-ping-mapping.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    pub mappings_dir: PathBuf,
    pub files_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl StagingLayout {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            mappings_dir: work_dir.join(MAPPINGS_DIR),
            files_dir: work_dir.join(FILES_DIR),
            work_dir: work_dir.to_path_buf(),
        }
    }
}

/// WireMock stub answering `GET <ping_path>` with 200.
pub fn ping_mapping(ping_path: &str) -> serde_json::Value {
    serde_json::json!({
        "request": {
            "method": "GET",
            "url": ping_path,
        },
        "response": {
            "status": 200,
            "body": "pong",
        },
    })
}

pub struct Stager<'a> {
    work_dir: &'a Path,
    ping_path: &'a str,
}

impl<'a> Stager<'a> {
    pub fn new(work_dir: &'a Path, ping_path: &'a str) -> Self {
        Self {
            work_dir,
            ping_path,
        }
    }

    pub async fn stage(
        &self,
        user_mappings: &Path,
        user_files: &Path,
    ) -> Result<StagingLayout, LaunchError> {
        for source in [user_mappings, user_files] {
            if !source.is_dir() {
                return Err(LaunchError::staging(
                    source,
                    anyhow::anyhow!("source directory does not exist"),
                ));
            }
        }

        let layout = StagingLayout::new(self.work_dir);
        self.check_disjoint(user_mappings, user_files).await?;

        empty_dir(&layout.mappings_dir)
            .await
            .map_err(|e| LaunchError::staging(&layout.mappings_dir, e))?;
        empty_dir(&layout.files_dir)
            .await
            .map_err(|e| LaunchError::staging(&layout.files_dir, e))?;

        let mappings = copy_dir_recursive(user_mappings, &layout.mappings_dir)
            .await
            .map_err(|e| LaunchError::staging(user_mappings, e))?;
        let files = copy_dir_recursive(user_files, &layout.files_dir)
            .await
            .map_err(|e| LaunchError::staging(user_files, e))?;

        let ping = layout.mappings_dir.join(PING_MAPPING_FILE);
        let body = serde_json::to_vec_pretty(&ping_mapping(self.ping_path))
            .map_err(|e| LaunchError::staging(&ping, e.into()))?;
        tokio::fs::write(&ping, body)
            .await
            .map_err(|e| LaunchError::staging(&ping, e.into()))?;

        tracing::info!(
            mappings,
            files,
            mappings_dir = %layout.mappings_dir.display(),
            files_dir = %layout.files_dir.display(),
            "Stubs staged"
        );
        Ok(layout)
    }

    /// Sources must not overlap either destination, since destinations get emptied.
    async fn check_disjoint(
        &self,
        user_mappings: &Path,
        user_files: &Path,
    ) -> Result<(), LaunchError> {
        tokio::fs::create_dir_all(self.work_dir)
            .await
            .map_err(|e| LaunchError::staging(self.work_dir, e.into()))?;
        let work_dir = tokio::fs::canonicalize(self.work_dir)
            .await
            .map_err(|e| LaunchError::staging(self.work_dir, e.into()))?;
        let mut destinations = Vec::with_capacity(2);
        for dir in [work_dir.join(MAPPINGS_DIR), work_dir.join(FILES_DIR)] {
            // An existing destination may itself be a symlink into the sources.
            let canonical = tokio::fs::canonicalize(&dir).await;
            destinations.push(canonical.unwrap_or(dir));
        }

        for source in [user_mappings, user_files] {
            let resolved = tokio::fs::canonicalize(source)
                .await
                .map_err(|e| LaunchError::staging(source, e.into()))?;
            for dest in &destinations {
                if resolved.starts_with(dest) || dest.starts_with(&resolved) {
                    return Err(LaunchError::staging(
                        source,
                        anyhow::anyhow!(
                            "source overlaps staging directory {}; move the stubs or change launch.work_dir",
                            dest.display()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
