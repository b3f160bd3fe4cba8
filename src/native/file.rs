use std::path::{Path, PathBuf};

/// Ensure `path` exists as an empty directory, removing whatever was there.
pub async fn empty_dir(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to clear {}: {}", path.display(), e))?;
        }
        Ok(_) => {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to remove {}: {}", path.display(), e))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => anyhow::bail!("Failed to stat {}: {}", path.display(), e),
    }
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("mkdir {} failed: {}", path.display(), e))?;
    Ok(())
}

/// Recursively copy the contents of `src` into the existing directory `dst`.
/// Returns the number of files copied.
pub async fn copy_dir_recursive(src: &Path, dst: &Path) -> anyhow::Result<usize> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || {
        if !src.is_dir() {
            anyhow::bail!("{} is not a directory", src.display());
        }
        let mut copied = 0;
        copy_tree(&src, &dst, &mut copied)?;
        Ok(copied)
    })
    .await?
}

fn copy_tree(src: &Path, dst: &Path, copied: &mut usize) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(src)
        .map_err(|e| anyhow::anyhow!("Failed to read directory {}: {}", src.display(), e))?;

    for entry in entries {
        let entry = entry?;
        let from = entry.path();
        let to: PathBuf = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            std::fs::create_dir_all(&to)
                .map_err(|e| anyhow::anyhow!("mkdir {} failed: {}", to.display(), e))?;
            copy_tree(&from, &to, copied)?;
        } else {
            // Follows symlinks, so linked fixtures land as regular files.
            std::fs::copy(&from, &to).map_err(|e| {
                anyhow::anyhow!("Copy {} -> {} failed: {}", from.display(), to.display(), e)
            })?;
            *copied += 1;
        }
    }
    Ok(())
}

/// Read a file as text, replacing invalid UTF-8. A missing file reads as empty.
pub async fn read_lossy(path: &Path) -> anyhow::Result<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(anyhow::anyhow!("Failed to read {}: {}", path.display(), e)),
    }
}
