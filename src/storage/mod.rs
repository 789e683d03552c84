use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::trace;

use crate::error::{Error, Result};

/// Where reference, screenshot and diff artifacts live
#[allow(async_fn_in_trait)]
pub trait Storage {
    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Writes `bytes`, replacing any existing file and creating parent directories
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Deletes the file; a file that is already gone is not an error
    async fn remove_file(&self, path: &Path) -> Result<()>;
}

/// Local filesystem storage
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl Storage for FsStorage {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(|e| Error::storage(path, e))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(|e| Error::storage(path, e))
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(parent, e))?;
        }
        trace!("Writing {} bytes to {}", bytes.len(), path.display());
        fs::write(path, bytes).await.map_err(|e| Error::storage(path, e))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                trace!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_creates_parents_and_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("shot.png");

        FsStorage.write_file(&path, b"first").await.unwrap();
        FsStorage.write_file(&path, b"second").await.unwrap();

        assert!(FsStorage.exists(&path).await.unwrap());
        assert_eq!(FsStorage.read(&path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_remove_missing_file_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("diff.png");

        FsStorage.remove_file(&path).await.unwrap();
        FsStorage.write_file(&path, b"diff").await.unwrap();
        FsStorage.remove_file(&path).await.unwrap();

        assert!(!FsStorage.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let err = FsStorage.read(&dir.path().join("missing.png")).await.unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }
}
