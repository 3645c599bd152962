//! Local filesystem driver
//!
//! Serves a directory on the host as the FTP root and authenticates against
//! the configured credentials.

use std::io;
use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use log::info;
use tokio::fs;
use tokio::io::AsyncSeekExt;

use crate::auth::{Credentials, validate_password};
use crate::error::{AuthError, StorageError};
use crate::storage::driver::{DirectoryItem, Driver, FileReader, FileWriter};
use crate::storage::validation::virtual_to_real_path;

pub struct LocalDriver {
    root: PathBuf,
    credentials: Credentials,
}

impl LocalDriver {
    pub fn new(root: impl Into<PathBuf>, credentials: Credentials) -> Self {
        Self {
            root: root.into(),
            credentials,
        }
    }

    /// Creates the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!("Server root directory: {}", self.root.display());
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        virtual_to_real_path(&self.root, path)
    }
}

/// Attaches the virtual path to I/O errors that carry a meaning for clients.
fn storage_error(path: &str, error: io::Error) -> StorageError {
    match error.kind() {
        io::ErrorKind::NotFound => StorageError::FileNotFound(path.to_string()),
        io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
        _ => StorageError::IoError(error),
    }
}

#[async_trait]
impl Driver for LocalDriver {
    async fn authenticate(&self, user: &str, pass: &str) -> Result<(), AuthError> {
        validate_password(user, pass, &self.credentials)
    }

    async fn change_dir(&self, path: &str) -> Result<(), StorageError> {
        let metadata = fs::metadata(self.resolve(path))
            .await
            .map_err(|_| StorageError::DirectoryNotFound(path.to_string()))?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(StorageError::NotADirectory(path.to_string()))
        }
    }

    async fn dir_contents(&self, path: &str) -> Result<Vec<DirectoryItem>, StorageError> {
        let real = self.resolve(path);
        let metadata = fs::metadata(&real)
            .await
            .map_err(|e| storage_error(path, e))?;
        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory(path.to_string()));
        }

        let mut entries = fs::read_dir(&real)
            .await
            .map_err(|e| storage_error(path, e))?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // vanished between readdir and stat
                Err(_) => continue,
            };
            items.push(DirectoryItem {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                directory: metadata.is_dir(),
                modified: metadata.modified().ok(),
            });
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn bytes(&self, path: &str) -> Result<u64, StorageError> {
        let metadata = fs::metadata(self.resolve(path))
            .await
            .map_err(|e| storage_error(path, e))?;
        if metadata.is_file() {
            Ok(metadata.len())
        } else {
            Err(StorageError::FileNotFound(path.to_string()))
        }
    }

    async fn get_file(&self, path: &str, offset: u64) -> Result<FileReader, StorageError> {
        let mut file = fs::File::open(self.resolve(path))
            .await
            .map_err(|e| storage_error(path, e))?;
        if !file.metadata().await?.is_file() {
            return Err(StorageError::FileNotFound(path.to_string()));
        }
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Box::new(file))
    }

    async fn put_file(&self, path: &str, append: bool) -> Result<FileWriter, StorageError> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(self.resolve(path))
            .await
            .map_err(|e| storage_error(path, e))?;
        Ok(Box::new(file))
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(self.resolve(path))
            .await
            .map_err(|e| storage_error(path, e))
    }

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError> {
        if path == "/" {
            return Err(StorageError::PermissionDenied(path.to_string()));
        }
        fs::remove_dir(self.resolve(path))
            .await
            .map_err(|e| storage_error(path, e))
    }

    async fn make_dir(&self, path: &str) -> Result<(), StorageError> {
        fs::create_dir(self.resolve(path))
            .await
            .map_err(|e| storage_error(path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        fs::rename(self.resolve(from), self.resolve(to))
            .await
            .map_err(|e| storage_error(from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn driver(root: &std::path::Path) -> LocalDriver {
        let credentials = [("alice".to_string(), "alice123".to_string())]
            .into_iter()
            .collect();
        LocalDriver::new(root, credentials)
    }

    #[tokio::test]
    async fn test_authenticate() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        assert!(driver.authenticate("alice", "alice123").await.is_ok());
        assert!(driver.authenticate("alice", "wrong").await.is_err());
    }

    #[tokio::test]
    async fn test_put_then_get_with_offset() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());

        let mut writer = driver.put_file("/a.txt", false).await.unwrap();
        writer.write_all(b"hello world").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut reader = driver.get_file("/a.txt", 6).await.unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "world");
        assert_eq!(driver.bytes("/a.txt").await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_append() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        std::fs::write(dir.path().join("log.txt"), "one\n").unwrap();

        let mut writer = driver.put_file("/log.txt", true).await.unwrap();
        writer.write_all(b"two\n").await.unwrap();
        writer.shutdown().await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("log.txt")).unwrap();
        assert_eq!(contents, "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_directories() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());

        driver.make_dir("/pub").await.unwrap();
        assert!(driver.change_dir("/pub").await.is_ok());
        assert!(matches!(
            driver.change_dir("/missing").await,
            Err(StorageError::DirectoryNotFound(_))
        ));

        std::fs::write(dir.path().join("pub/b.txt"), "b").unwrap();
        let items = driver.dir_contents("/").await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].directory);

        driver.rename("/pub/b.txt", "/c.txt").await.unwrap();
        driver.delete_dir("/pub").await.unwrap();
        driver.delete_file("/c.txt").await.unwrap();
        assert!(driver.dir_contents("/").await.unwrap().is_empty());
        assert!(driver.delete_dir("/").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        assert!(matches!(
            driver.bytes("/nope").await,
            Err(StorageError::FileNotFound(_))
        ));
        assert!(driver.get_file("/nope", 0).await.is_err());
    }
}
