// Retrieval API consumed by HTTP handlers
//
// Every query goes through the store's single lock for bookkeeping only.
// Content is read from storage after the lock is released, so a slow read
// never blocks the ingest writer or other lookups.

use crate::error::{MuxerError, Result};
use crate::init::{InitFileGenerator, Track};
use crate::naming::{self, NameKind};
use crate::playlist::{MediaPlaylistGenerator, PlaylistGenerator, Variant};
use crate::store::SegmentStore;
use bytes::Bytes;
use std::io::ErrorKind;
use std::sync::Arc;

pub struct MuxerServer {
    store: Arc<SegmentStore>,
    variant: Variant,
    video_track: Option<Track>,
    audio_track: Option<Track>,
    multivariant_playlist: Bytes,
    playlist_generator: Arc<dyn PlaylistGenerator>,
    init_generator: Arc<dyn InitFileGenerator>,
}

impl MuxerServer {
    pub fn new(
        store: Arc<SegmentStore>,
        variant: Variant,
        video_track: Option<Track>,
        audio_track: Option<Track>,
        multivariant_playlist: Bytes,
        init_generator: Arc<dyn InitFileGenerator>,
    ) -> Self {
        Self {
            store,
            variant,
            video_track,
            audio_track,
            multivariant_playlist,
            playlist_generator: Arc::new(MediaPlaylistGenerator),
            init_generator,
        }
    }

    /// Replace the default media playlist generator
    #[must_use]
    pub fn with_playlist_generator(mut self, generator: Arc<dyn PlaylistGenerator>) -> Self {
        self.playlist_generator = generator;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Ids of the last finalized segment and the last in-progress part
    #[must_use]
    pub fn last_ids(&self) -> (Option<u64>, Option<u64>) {
        self.store.last_ids()
    }

    /// Multivariant playlist, fixed at construction
    #[must_use]
    pub fn index(&self) -> Bytes {
        self.multivariant_playlist.clone()
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        self.store.prefix()
    }

    pub async fn init_file(&self) -> Result<Bytes> {
        let handle = self
            .init_generator
            .generate(
                self.video_track.as_ref(),
                self.audio_track.as_ref(),
                Arc::clone(self.store.storage()),
                self.store.prefix(),
            )
            .await
            .map_err(|e| {
                tracing::error!("Init file generation failed: {}", e);
                MuxerError::GenerationFailed(e)
            })?;

        Ok(handle.read_all().await?)
    }

    pub fn playlist(&self, is_delta_update: bool) -> Result<Bytes> {
        let snapshot = self.store.snapshot();

        self.playlist_generator
            .generate(is_delta_update, self.variant, &snapshot)
            .map_err(|e| {
                tracing::error!("Playlist generation failed: {}", e);
                MuxerError::GenerationFailed(e)
            })
    }

    pub async fn segment(&self, id: u64) -> Result<Bytes> {
        self.read(NameKind::Segment, id).await
    }

    pub async fn part(&self, id: u64) -> Result<Bytes> {
        self.read(NameKind::Part, id).await
    }

    async fn read(&self, kind: NameKind, id: u64) -> Result<Bytes> {
        let Some(handle) = self.store.resolve(kind, id) else {
            let name = naming::encode(self.store.prefix(), kind, id);
            tracing::debug!("{} not indexed: {}", kind, name);
            return Err(MuxerError::NotFound(name));
        };

        match handle.read_all().await {
            Ok(data) => Ok(data),
            // Evicted and released between lookup and open
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} released before read: {}", kind, handle.key());
                Err(MuxerError::NotFound(handle.key().to_string()))
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", handle.key(), e);
                Err(MuxerError::Storage(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MuxerSettings;
    use crate::error::GenerateError;
    use crate::store::StoreWriter;
    use async_trait::async_trait;
    use hlsmux_storage::{MemoryStorage, SegmentStorage, StorageHandle};
    use std::time::Duration;

    struct StaticInit;

    #[async_trait]
    impl InitFileGenerator for StaticInit {
        async fn generate(
            &self,
            video_track: Option<&Track>,
            audio_track: Option<&Track>,
            storage: Arc<dyn SegmentStorage>,
            prefix: &str,
        ) -> std::result::Result<StorageHandle, GenerateError> {
            if video_track.is_none() && audio_track.is_none() {
                return Err(GenerateError::NoTracks);
            }
            let handle = StorageHandle::create(
                storage,
                naming::init_file_name(prefix),
                Bytes::from_static(b"ftypmoov"),
            )
            .await?;
            Ok(handle)
        }
    }

    fn video() -> Track {
        Track {
            id: 1,
            codec: "avc1.64001f".to_string(),
            clock_rate: 90_000,
        }
    }

    fn new_muxer(video_track: Option<Track>) -> (MuxerServer, StoreWriter) {
        let settings = MuxerSettings {
            prefix: "stream".to_string(),
            segment_count: 0,
            ..MuxerSettings::default()
        };
        let (store, writer) = SegmentStore::create(&settings, Arc::new(MemoryStorage::new()));
        let muxer = MuxerServer::new(
            store,
            Variant::LowLatency,
            video_track,
            None,
            Bytes::from_static(b"#EXTM3U\n"),
            Arc::new(StaticInit),
        );
        (muxer, writer)
    }

    #[tokio::test]
    async fn test_segment_lookup() {
        let (muxer, mut writer) = new_muxer(Some(video()));

        writer
            .finalize_segment(Bytes::from_static(b"segment zero"), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(muxer.segment(0).await.unwrap(), Bytes::from_static(b"segment zero"));
        let err = muxer.segment(1).await.unwrap_err();
        assert!(matches!(err, MuxerError::NotFound(ref name) if name == "stream_seg1.mp4"));
    }

    #[tokio::test]
    async fn test_part_lookup() {
        let (muxer, mut writer) = new_muxer(Some(video()));

        let id = writer
            .append_part(Bytes::from_static(b"part"), Duration::from_millis(250), true)
            .await
            .unwrap();

        assert_eq!(muxer.part(id).await.unwrap(), Bytes::from_static(b"part"));
        assert!(matches!(muxer.part(id + 1).await, Err(MuxerError::NotFound(_))));
        // Same id, other index
        assert!(matches!(muxer.segment(id).await, Err(MuxerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_eviction_turns_success_into_not_found() {
        let (muxer, mut writer) = new_muxer(Some(video()));

        writer.finalize_segment(Bytes::from_static(b"s0"), Duration::from_secs(1)).await.unwrap();
        writer.finalize_segment(Bytes::from_static(b"s1"), Duration::from_secs(1)).await.unwrap();
        assert!(muxer.segment(0).await.is_ok());

        writer.evict_oldest(1).await.unwrap();

        assert!(matches!(muxer.segment(0).await, Err(MuxerError::NotFound(_))));
        let playlist = String::from_utf8(muxer.playlist(false).unwrap().to_vec()).unwrap();
        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:1\n"));
        assert!(!playlist.contains("stream_seg0.mp4"));
        assert!(playlist.contains("stream_seg1.mp4"));
    }

    #[tokio::test]
    async fn test_last_ids() {
        let (muxer, mut writer) = new_muxer(Some(video()));
        assert_eq!(muxer.last_ids(), (None, None));

        writer.finalize_segment(Bytes::from_static(b"s0"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(muxer.last_ids(), (Some(0), None));

        writer.append_part(Bytes::from_static(b"p"), Duration::from_millis(500), true).await.unwrap();
        let second = writer
            .append_part(Bytes::from_static(b"p"), Duration::from_millis(500), false)
            .await
            .unwrap();
        assert_eq!(muxer.last_ids(), (Some(0), Some(second)));
    }

    #[tokio::test]
    async fn test_init_file() {
        let (muxer, _writer) = new_muxer(Some(video()));
        assert_eq!(muxer.init_file().await.unwrap(), Bytes::from_static(b"ftypmoov"));
    }

    #[tokio::test]
    async fn test_init_file_generation_failed() {
        let (muxer, _writer) = new_muxer(None);
        let err = muxer.init_file().await.unwrap_err();
        assert!(matches!(err, MuxerError::GenerationFailed(GenerateError::NoTracks)));
    }

    #[tokio::test]
    async fn test_index_and_prefix() {
        let (muxer, _writer) = new_muxer(Some(video()));
        assert_eq!(muxer.index(), Bytes::from_static(b"#EXTM3U\n"));
        assert_eq!(muxer.prefix(), "stream");
        assert_eq!(muxer.variant(), Variant::LowLatency);
    }

    #[tokio::test]
    async fn test_custom_playlist_generator() {
        struct Broken;

        impl PlaylistGenerator for Broken {
            fn generate(
                &self,
                _is_delta_update: bool,
                _variant: Variant,
                _snapshot: &crate::playlist::PlaylistSnapshot,
            ) -> std::result::Result<Bytes, GenerateError> {
                Err(GenerateError::InvalidState("no segments".to_string()))
            }
        }

        let (muxer, _writer) = new_muxer(Some(video()));
        let muxer = muxer.with_playlist_generator(Arc::new(Broken));

        assert!(matches!(muxer.playlist(false), Err(MuxerError::GenerationFailed(_))));
    }

    #[tokio::test]
    async fn test_released_storage_reports_not_found() {
        let (muxer, mut writer) = new_muxer(Some(video()));
        writer.finalize_segment(Bytes::from_static(b"s0"), Duration::from_secs(1)).await.unwrap();

        // Storage released while the index still points at it
        muxer.store().storage().delete("stream_seg0.mp4").await.unwrap();

        assert!(matches!(muxer.segment(0).await, Err(MuxerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unreadable_storage_reports_storage_error() {
        struct UnreadableStorage(MemoryStorage);

        #[async_trait]
        impl SegmentStorage for UnreadableStorage {
            async fn write(&self, key: &str, data: Bytes) -> std::io::Result<()> {
                self.0.write(key, data).await
            }
            async fn open(&self, _key: &str) -> std::io::Result<hlsmux_storage::StorageReader> {
                Err(std::io::Error::other("i/o error"))
            }
            async fn delete(&self, key: &str) -> std::io::Result<()> {
                self.0.delete(key).await
            }
            async fn exists(&self, key: &str) -> std::io::Result<bool> {
                self.0.exists(key).await
            }
        }

        let (store, mut writer) = SegmentStore::create(
            &MuxerSettings::default(),
            Arc::new(UnreadableStorage(MemoryStorage::new())),
        );
        let muxer = MuxerServer::new(
            store,
            Variant::LowLatency,
            Some(video()),
            None,
            Bytes::from_static(b"#EXTM3U\n"),
            Arc::new(StaticInit),
        );

        writer.append_part(Bytes::from_static(b"p0"), Duration::from_millis(500), true).await.unwrap();
        writer.finalize_segment(Bytes::from_static(b"s0"), Duration::from_secs(1)).await.unwrap();

        let err = muxer.segment(0).await.unwrap_err();
        assert!(matches!(err, MuxerError::Storage(ref e) if e.kind() == std::io::ErrorKind::Other));
        assert!(err.is_retryable());
        assert!(matches!(muxer.part(0).await, Err(MuxerError::Storage(_))));
    }
}
