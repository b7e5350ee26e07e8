// In-memory storage backend
//
// Useful for:
// - Testing without filesystem I/O
// - Live sessions that only need the current rolling window
//
// Note: Data is lost on restart
//
// Readers hold a reference-counted view of the stored buffer, so deleting or
// overwriting a key never affects a read already in progress.

use super::{SegmentStorage, StorageReader};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::{Cursor, Error, ErrorKind, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Entry {
    data: Bytes,
    write_time: Instant,
}

#[derive(Default)]
struct MemoryStorageInner {
    data: HashMap<String, Entry>,
}

impl MemoryStorageInner {
    fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }
}

/// In-memory storage backend
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of stored keys
    pub async fn key_count(&self) -> usize {
        self.inner.lock().await.data.len()
    }
}

#[async_trait]
impl SegmentStorage for MemoryStorage {
    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let size = data.len();
        let mut inner = self.inner.lock().await;
        inner.data.insert(
            key.to_string(),
            Entry {
                data,
                write_time: Instant::now(),
            },
        );

        tracing::trace!("Wrote to memory: {} ({} bytes)", key, size);

        Ok(())
    }

    async fn open(&self, key: &str) -> Result<StorageReader> {
        let inner = self.inner.lock().await;
        match inner.data.get(key) {
            Some(entry) => {
                tracing::trace!("Opened from memory: {} ({} bytes)", key, entry.data.len());
                Ok(Box::pin(Cursor::new(entry.data.clone())))
            }
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("Key not found: {key}"),
            )),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.remove(key) {
            tracing::trace!("Deleted from memory: {}", key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.inner.lock().await.data.contains_key(key))
    }

    async fn cleanup(&self, older_than: Duration) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let cutoff = Instant::now()
            .checked_sub(older_than)
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "older_than duration is too large"))?;

        let expired_keys: Vec<String> = inner
            .data
            .iter()
            .filter(|(_, entry)| entry.write_time < cutoff)
            .map(|(key, _)| key.clone())
            .collect();

        let mut deleted = 0;
        for key in expired_keys {
            if inner.remove(&key) {
                deleted += 1;
            }
        }

        tracing::debug!(
            "Cleanup expired: deleted {} keys older than {:?}",
            deleted,
            older_than
        );

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_key(storage: &MemoryStorage, key: &str) -> Result<Vec<u8>> {
        let mut reader = storage.open(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    #[tokio::test]
    async fn test_memory_storage_write_open() {
        let storage = MemoryStorage::new();

        let data = Bytes::from_static(b"test segment data");
        storage.write("stream_seg0.mp4", data.clone()).await.unwrap();

        assert_eq!(read_key(&storage, "stream_seg0.mp4").await.unwrap(), data.to_vec());
        assert!(storage.exists("stream_seg0.mp4").await.unwrap());
        assert_eq!(storage.key_count().await, 1);

        storage.delete("stream_seg0.mp4").await.unwrap();

        assert!(!storage.exists("stream_seg0.mp4").await.unwrap());
        assert_eq!(storage.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_memory_storage_not_found() {
        let storage = MemoryStorage::new();

        let err = read_key(&storage, "stream_seg0.mp4").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_memory_storage_reader_survives_delete() {
        let storage = MemoryStorage::new();
        storage
            .write("stream_part3.mp4", Bytes::from_static(b"part three"))
            .await
            .unwrap();

        let mut reader = storage.open("stream_part3.mp4").await.unwrap();
        storage.delete("stream_part3.mp4").await.unwrap();

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"part three");
    }

    #[tokio::test]
    async fn test_memory_storage_overwrite_key() {
        let storage = MemoryStorage::new();

        storage.write("key1", Bytes::from_static(b"hello")).await.unwrap();
        storage.write("key1", Bytes::from_static(b"world!")).await.unwrap();
        assert_eq!(storage.key_count().await, 1);
        assert_eq!(read_key(&storage, "key1").await.unwrap(), b"world!");
    }

    #[tokio::test]
    async fn test_memory_storage_cleanup() {
        let storage = MemoryStorage::new();
        storage.write("old", Bytes::from_static(b"0")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        storage.write("new", Bytes::from_static(b"1")).await.unwrap();

        let deleted = storage.cleanup(Duration::from_millis(50)).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(!storage.exists("old").await.unwrap());
        assert!(storage.exists("new").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_storage_cleanup_rejects_huge_age() {
        let storage = MemoryStorage::new();
        storage.write("a", Bytes::from_static(b"data")).await.unwrap();

        let err = storage.cleanup(Duration::MAX).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(storage.exists("a").await.unwrap());
    }
}
