//! Compiled and cached template output.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

pub const COMPILED_DIR: &str = "view_compiled";
pub const CACHED_DIR: &str = "view_cache";

/// Template caches under the cache root.
#[derive(Debug, Clone)]
pub struct ViewCache {
    cache_dir: PathBuf,
}

impl ViewCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Remove every compiled template. Returns the number of entries removed.
    pub async fn clear_compiled(&self) -> Result<usize> {
        clear_dir(&self.cache_dir.join(COMPILED_DIR)).await
    }

    /// Remove every cached page. Returns the number of entries removed.
    pub async fn clear_cached(&self) -> Result<usize> {
        clear_dir(&self.cache_dir.join(CACHED_DIR)).await
    }
}

/// Empty a directory while keeping it in place.
async fn clear_dir(dir: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let result = if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.with_context(|| format!("failed to remove {}", path.display()))?;
        removed += 1;
    }

    debug!(dir = %dir.display(), removed, "cleared view cache");
    Ok(removed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clears_contents_but_keeps_directory() {
        let cache = tempfile::tempdir().unwrap();
        let compiled = cache.path().join(COMPILED_DIR);
        std::fs::create_dir_all(compiled.join("nested")).unwrap();
        std::fs::write(compiled.join("a.php"), "x").unwrap();

        let views = ViewCache::new(cache.path());
        assert_eq!(views.clear_compiled().await.unwrap(), 2);
        assert!(compiled.is_dir());
        assert_eq!(std::fs::read_dir(&compiled).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let cache = tempfile::tempdir().unwrap();
        assert_eq!(ViewCache::new(cache.path()).clear_cached().await.unwrap(), 0);
    }
}
