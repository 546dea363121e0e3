//! Local filesystem archive.
//!
//! Keys map to paths under the root directory; prefixes are directories.
//! Used for development and tests. Production deployments should use
//! S3Storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{ArchiveStorage, Listing};

const TMP_EXTENSION: &str = "tmp";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key.trim_start_matches('/'))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveStorage for LocalStorage {
    async fn list(&self, prefix: &str) -> Result<Listing> {
        let dir = self.path(prefix);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Listing::default()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut listing = Listing::default();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                listing.prefixes.push(format!("{prefix}{name}/"));
            } else if Path::new(&name).extension().and_then(|e| e.to_str()) != Some(TMP_EXTENSION)
            {
                listing.objects.push(format!("{prefix}{name}"));
            }
        }
        listing.prefixes.sort();
        listing.objects.sort();
        Ok(listing)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::missing_archive(format!("no object at {key}")))
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write(&self, key: &str, body: &[u8], _content_type: &str) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension(TMP_EXTENSION);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(body).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Wrote {} bytes to {:?}", body.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage
            .write("local/2020/08/03/1/data/a.html", b"hello", "text/html")
            .await
            .unwrap();
        let data = storage.read("local/2020/08/03/1/data/a.html").await.unwrap();
        assert_eq!(data, b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let err = storage.read("nope.html").await.unwrap_err();
        assert!(matches!(err, AppError::MissingArchive(_)));
    }

    #[tokio::test]
    async fn test_list_splits_prefixes_and_objects() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage
            .write("run/아파트/x_statistics.html", b"s", "text/html")
            .await
            .unwrap();
        storage
            .write("run/아파트/bid/x_bid.html", b"b", "text/html")
            .await
            .unwrap();

        let listing = storage.list("run/아파트/").await.unwrap();
        assert_eq!(listing.prefixes, vec!["run/아파트/bid/"]);
        assert_eq!(listing.objects, vec!["run/아파트/x_statistics.html"]);
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.list("local/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write("d/a.html", b"one", "text/html").await.unwrap();
        storage.write("d/a.html", b"two", "text/html").await.unwrap();

        let listing = storage.list("d/").await.unwrap();
        assert_eq!(listing.objects, vec!["d/a.html"]);
        assert_eq!(storage.read("d/a.html").await.unwrap(), b"two".to_vec());
    }
}
