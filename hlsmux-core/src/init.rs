//! Initialization file boundary.
//!
//! Producing the file (container formatting) happens outside this crate; the
//! muxer only calls the generator and reads back what it stored.

use crate::error::GenerateError;
use async_trait::async_trait;
use hlsmux_storage::{SegmentStorage, StorageHandle};
use std::sync::Arc;

/// Opaque description of one media track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: u32,
    /// Codec identifier as it appears in playlists (e.g. "avc1.64001f")
    pub codec: String,
    pub clock_rate: u32,
}

#[async_trait]
pub trait InitFileGenerator: Send + Sync {
    /// Write the initialization file into `storage` and return its handle
    async fn generate(
        &self,
        video_track: Option<&Track>,
        audio_track: Option<&Track>,
        storage: Arc<dyn SegmentStorage>,
        prefix: &str,
    ) -> Result<StorageHandle, GenerateError>;
}
