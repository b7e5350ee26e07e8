// Media segment storage abstraction layer
//
// Supports multiple storage backends:
// - FileStorage: Local filesystem (default)
// - MemoryStorage: In-memory (for testing/short-lived sessions)
//
// The storage layer is a pure key-value store keyed by generated segment
// names. It does not know about segment ordering, retention windows or
// playlists; those belong to the segment store in hlsmux-core.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Result;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Readable byte source returned by [`SegmentStorage::open`].
///
/// The underlying resource (file descriptor, buffer reference) is released
/// when the reader is dropped.
pub type StorageReader = Pin<Box<dyn AsyncRead + Send>>;

/// Storage trait for pluggable backends
#[async_trait]
pub trait SegmentStorage: Send + Sync {
    /// Write data to storage, replacing any previous content under `key`
    ///
    /// # Arguments
    /// * `key` - Storage key (e.g., "`stream_seg12.mp4`")
    /// * `data` - Binary data to store
    async fn write(&self, key: &str, data: Bytes) -> Result<()>;

    /// Open a reader over the content stored under `key`
    ///
    /// # Returns
    /// A reader or `NotFound` error
    async fn open(&self, key: &str) -> Result<StorageReader>;

    /// Delete single key from storage. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Cleanup expired data
    ///
    /// Deletes all data older than the specified duration and returns the
    /// number of keys removed. No-op by default.
    async fn cleanup(&self, _older_than: Duration) -> Result<usize> {
        Ok(0)
    }
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local filesystem storage
    File,
    /// In-memory storage
    #[default]
    Memory,
}

/// Handle to one stored object: a key bound to the backend holding it.
///
/// Cloning the handle does not copy data.
#[derive(Clone)]
pub struct StorageHandle {
    key: String,
    storage: Arc<dyn SegmentStorage>,
}

impl StorageHandle {
    #[must_use]
    pub fn new(key: impl Into<String>, storage: Arc<dyn SegmentStorage>) -> Self {
        Self {
            key: key.into(),
            storage,
        }
    }

    /// Write `data` to the backend and return a handle to it
    pub async fn create(
        storage: Arc<dyn SegmentStorage>,
        key: impl Into<String>,
        data: Bytes,
    ) -> Result<Self> {
        let key = key.into();
        storage.write(&key, data).await?;
        Ok(Self { key, storage })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Open a reader over the stored content
    pub async fn open(&self) -> Result<StorageReader> {
        self.storage.open(&self.key).await
    }

    /// Read the full content.
    ///
    /// The reader is scoped to this call and dropped on every exit path.
    pub async fn read_all(&self) -> Result<Bytes> {
        let mut reader = self.open().await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Delete the stored content. Readers already opened keep their view.
    pub async fn release(&self) -> Result<()> {
        self.storage.delete(&self.key).await
    }
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle").field("key", &self.key).finish()
    }
}

pub use file::FileStorage;
pub use memory::MemoryStorage;
