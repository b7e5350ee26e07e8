// File system storage backend
//
// Default storage backend using a local directory with hash-based paths.
// Keys are hashed with SHA256 before being used as filenames, so arbitrary
// names can never escape the base directory.
//
// An open reader keeps its file descriptor; deleting the key removes the
// directory entry only, so in-flight reads complete on unix platforms.

use super::{SegmentStorage, StorageReader};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::{Error, ErrorKind, Result};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::fs;

/// Check if a filename matches the SHA256 hex hash pattern (exactly 64 hex chars).
/// Cleanup only touches such files, so a misconfigured base path is harmless.
fn is_sha256_filename(name: &str) -> bool {
    name.len() == 64 && name.chars().all(|c| c.is_ascii_hexdigit())
}

/// Hash storage key into a safe filename
fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// File system storage backend
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create new file storage with base path. The directory is created on
    /// first write if missing.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn get_path(&self, key: &str) -> PathBuf {
        self.base_path.join(hash_key(key))
    }
}

#[async_trait]
impl SegmentStorage for FileStorage {
    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;

        let file_path = self.get_path(key);
        let size = data.len();
        fs::write(&file_path, data).await?;

        tracing::trace!("Wrote: {:?} ({} bytes) for key: {}", file_path, size, key);

        Ok(())
    }

    async fn open(&self, key: &str) -> Result<StorageReader> {
        let file_path = self.get_path(key);
        let file = fs::File::open(&file_path).await?;

        tracing::trace!("Opened: {:?} for key: {}", file_path, key);

        Ok(Box::pin(file))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let file_path = self.get_path(key);

        match fs::remove_file(&file_path).await {
            Ok(()) => {
                tracing::trace!("Deleted: {:?} for key: {}", file_path, key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        fs::try_exists(self.get_path(key)).await
    }

    async fn cleanup(&self, older_than: Duration) -> Result<usize> {
        let cutoff_time = SystemTime::now()
            .checked_sub(older_than)
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "older_than duration is too large"))?;

        if !fs::try_exists(&self.base_path).await.unwrap_or(false) {
            tracing::debug!("Cleanup base path does not exist: {:?}", self.base_path);
            return Ok(0);
        }

        let mut deleted = 0;
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            if !is_sha256_filename(&file_name.to_string_lossy()) {
                continue;
            }

            if let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) {
                if modified < cutoff_time && fs::remove_file(&path).await.is_ok() {
                    deleted += 1;
                    tracing::trace!("Deleted expired file: {:?}", path);
                }
            }
        }

        tracing::info!(
            "Cleanup completed: scanned {:?}, deleted {} files older than {:?}",
            self.base_path,
            deleted,
            older_than
        );

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_hash_key_is_sha256_filename() {
        let hashed = hash_key("stream_seg0.mp4");
        assert!(is_sha256_filename(&hashed));
        assert!(!is_sha256_filename("stream_seg0.mp4"));
        assert_ne!(hashed, hash_key("stream_seg1.mp4"));
    }

    #[tokio::test]
    async fn test_file_storage_write_open() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("segments"));

        let data = Bytes::from_static(b"test segment data");
        storage.write("stream_seg0.mp4", data.clone()).await.unwrap();

        let mut reader = storage.open("stream_seg0.mp4").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, data.to_vec());

        assert!(storage.exists("stream_seg0.mp4").await.unwrap());

        storage.delete("stream_seg0.mp4").await.unwrap();
        assert!(!storage.exists("stream_seg0.mp4").await.unwrap());

        // Deleting twice is fine
        storage.delete("stream_seg0.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_open_missing() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let err = storage.open("stream_part9.mp4").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_file_storage_path_traversal_key() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        storage
            .write("../../etc/passwd", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let mut names = Vec::new();
        let mut entries = fs::read_dir(temp_dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names.len(), 1);
        assert!(is_sha256_filename(&names[0]));
    }

    #[tokio::test]
    async fn test_file_storage_cleanup() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        storage
            .write("stream_seg0.mp4", Bytes::from_static(b"data0"))
            .await
            .unwrap();
        storage
            .write("stream_seg1.mp4", Bytes::from_static(b"data1"))
            .await
            .unwrap();
        // Unrelated file in the same directory
        fs::write(temp_dir.path().join("notes.txt"), b"keep")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        storage
            .write("stream_seg2.mp4", Bytes::from_static(b"data2"))
            .await
            .unwrap();

        let deleted = storage.cleanup(Duration::from_millis(50)).await.unwrap();

        assert_eq!(deleted, 2);
        assert!(!storage.exists("stream_seg0.mp4").await.unwrap());
        assert!(!storage.exists("stream_seg1.mp4").await.unwrap());
        assert!(storage.exists("stream_seg2.mp4").await.unwrap());
        assert!(fs::try_exists(temp_dir.path().join("notes.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_storage_cleanup_rejects_huge_age() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage
            .write("stream_seg0.mp4", Bytes::from_static(b"data0"))
            .await
            .unwrap();

        let err = storage.cleanup(Duration::MAX).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(storage.exists("stream_seg0.mp4").await.unwrap());
    }
}
