//! On-disk snapshot of a parsed recipe directory

use crate::models::PackageRecipeDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprig_errors::{Error, StoreError};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

/// Bumped whenever the descriptor layout changes
pub const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub format: u32,
    pub recipe_dir: PathBuf,
    pub generated_at: DateTime<Utc>,
    /// Package directory names the snapshot was built from, sorted
    pub recipes: Vec<String>,
    pub packages: Vec<PackageRecipeDescriptor>,
}

impl IndexSnapshot {
    #[must_use]
    pub fn new(
        recipe_dir: &Path,
        recipes: Vec<String>,
        packages: Vec<PackageRecipeDescriptor>,
    ) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            recipe_dir: recipe_dir.to_path_buf(),
            generated_at: Utc::now(),
            recipes,
            packages,
        }
    }

    /// True if the snapshot was taken from `dir`, covers exactly `recipes`,
    /// and is not older than the newest recipe file
    #[must_use]
    pub fn is_fresh_for(&self, dir: &Path, recipes: &[String], newest: Option<SystemTime>) -> bool {
        self.format == SNAPSHOT_FORMAT
            && self.recipe_dir == dir
            && self.recipes == recipes
            && newest.is_none_or(|t| DateTime::<Utc>::from(t) <= self.generated_at)
    }
}

/// Index cache manager
#[derive(Clone, Debug)]
pub struct IndexCache {
    cache_dir: PathBuf,
}

impl IndexCache {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.cache_dir.join("index.json")
    }

    /// Load the cached snapshot, `None` if there is none
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file exists but cannot be read or
    /// parsed.
    pub async fn load(&self) -> Result<Option<IndexSnapshot>, Error> {
        let path = self.index_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io_with_path(&e, &path)),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Save a snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the file cannot be written.
    pub async fn save(&self, snapshot: &IndexSnapshot) -> Result<(), Error> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| StoreError::IoError {
                message: format!("failed to create cache dir: {e}"),
            })?;

        let path = self.index_path();
        let json = serde_json::to_string(snapshot)?;

        // Write to temporary file first
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .await
            .map_err(|e| StoreError::IoError {
                message: format!("failed to write cache: {e}"),
            })?;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::IoError {
                message: format!("failed to rename cache file: {e}"),
            })?;

        Ok(())
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(self.index_path()).await.is_ok()
    }

    /// Remove the cached snapshot
    pub async fn clear(&self) {
        let _ = fs::remove_file(self.index_path()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cache_operations() {
        let temp = tempdir().unwrap();
        let cache = IndexCache::new(temp.path());

        assert!(!cache.exists().await);
        assert!(cache.load().await.unwrap().is_none());

        let desc = PackageRecipeDescriptor::from_toml("zlib", "[[versions]]\nversion = \"1.3\"\n")
            .unwrap();
        let snapshot = IndexSnapshot::new(temp.path(), vec!["zlib".into()], vec![desc.clone()]);
        cache.save(&snapshot).await.unwrap();
        assert!(cache.exists().await);

        let loaded = cache.load().await.unwrap().unwrap();
        assert_eq!(loaded.packages, vec![desc]);
        assert!(loaded.is_fresh_for(temp.path(), &["zlib".into()], Some(SystemTime::UNIX_EPOCH)));
        assert!(!loaded.is_fresh_for(temp.path(), &[], None));

        cache.clear().await;
        assert!(!cache.exists().await);
    }
}
