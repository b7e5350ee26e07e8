// Segment/part store
//
// Authoritative snapshot of what is currently servable:
// - ordered window of finalized segments + name index
// - ordered parts of the segment under construction + name index
// - counters (next segment id, next part id, delete count)
//
// All of it lives behind one parking_lot::Mutex. The guard is !Send, so it
// cannot be held across an .await: storage writes for new data and deletes
// for evicted data always run outside the critical section.
//
// A single StoreWriter (not Clone) performs every mutation. Entries are
// indexed only after their bytes have been written, so any id a reader has
// observed is readable until evicted.

use crate::config::MuxerSettings;
use crate::error::Result;
use crate::naming::{self, NameKind};
use crate::playlist::PlaylistSnapshot;
use crate::segment::{Part, Segment};
use bytes::Bytes;
use hlsmux_storage::{SegmentStorage, StorageHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

struct StoreState {
    segments: VecDeque<Arc<Segment>>,
    segments_by_name: HashMap<String, Arc<Segment>>,
    next_segment_parts: Vec<Arc<Part>>,
    parts_by_name: HashMap<String, Arc<Part>>,
    next_segment_id: u64,
    next_part_id: u64,
    segment_delete_count: u64,
}

impl StoreState {
    /// Drop up to `n` oldest segments and their parts from sequences and
    /// indexes. Returns what was removed so the caller can release storage.
    fn remove_oldest(&mut self, n: usize) -> Vec<Arc<Segment>> {
        let count = n.min(self.segments.len());
        let removed: Vec<Arc<Segment>> = self.segments.drain(..count).collect();

        for segment in &removed {
            self.segments_by_name.remove(&segment.name);
            for part in &segment.parts {
                self.parts_by_name.remove(&part.name);
            }
        }

        self.segment_delete_count += removed.len() as u64;
        removed
    }
}

/// Shared, read-mostly view of the muxing session
pub struct SegmentStore {
    prefix: String,
    storage: Arc<dyn SegmentStorage>,
    state: Mutex<StoreState>,
}

impl SegmentStore {
    /// Create an empty store and the unique writer that feeds it
    pub fn create(settings: &MuxerSettings, storage: Arc<dyn SegmentStorage>) -> (Arc<Self>, StoreWriter) {
        let store = Arc::new(Self {
            prefix: settings.prefix.clone(),
            storage,
            state: Mutex::new(StoreState {
                segments: VecDeque::new(),
                segments_by_name: HashMap::new(),
                next_segment_parts: Vec::new(),
                parts_by_name: HashMap::new(),
                next_segment_id: settings.start_segment_id,
                next_part_id: 0,
                segment_delete_count: 0,
            }),
        });

        let writer = StoreWriter {
            store: Arc::clone(&store),
            segment_count: settings.segment_count,
        };

        (store, writer)
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn SegmentStorage> {
        &self.storage
    }

    /// Id of the last finalized segment and of the last in-progress part
    #[must_use]
    pub fn last_ids(&self) -> (Option<u64>, Option<u64>) {
        let state = self.state.lock();
        (
            state.segments.back().map(|s| s.id),
            state.next_segment_parts.last().map(|p| p.id),
        )
    }

    /// Everything a playlist generator needs, copied under one lock
    #[must_use]
    pub fn snapshot(&self) -> PlaylistSnapshot {
        let state = self.state.lock();
        PlaylistSnapshot {
            segments: state.segments.iter().cloned().collect(),
            parts: state.next_segment_parts.clone(),
            next_part_id: state.next_part_id,
            delete_count: state.segment_delete_count,
            prefix: self.prefix.clone(),
        }
    }

    /// Resolve a generated name to its storage handle.
    ///
    /// The lock only covers the map lookup; reading the handle is up to the
    /// caller.
    #[must_use]
    pub fn resolve(&self, kind: NameKind, id: u64) -> Option<StorageHandle> {
        let name = naming::encode(&self.prefix, kind, id);
        let state = self.state.lock();
        match kind {
            NameKind::Segment => state.segments_by_name.get(&name).map(|s| s.handle.clone()),
            NameKind::Part => state.parts_by_name.get(&name).map(|p| p.handle.clone()),
        }
    }

    /// Id the next part will get (advertised as the preload hint)
    #[must_use]
    pub fn next_part_id(&self) -> u64 {
        self.state.lock().next_part_id
    }

    /// Media sequence number the next finalized segment will get
    #[must_use]
    pub fn next_media_sequence(&self) -> u64 {
        let state = self.state.lock();
        state.segment_delete_count + state.segments.len() as u64
    }

    /// Whether the segment with media sequence `msn` (or, with `part`, the
    /// part at that index inside it) has been produced.
    #[must_use]
    pub fn has_media_sequence(&self, msn: u64, part: Option<u64>) -> bool {
        let state = self.state.lock();
        let next_msn = state.segment_delete_count + state.segments.len() as u64;

        if msn < next_msn {
            return true;
        }

        match part {
            Some(index) => msn == next_msn && (state.next_segment_parts.len() as u64) > index,
            None => false,
        }
    }
}

/// Single writer of a [`SegmentStore`], owned by the ingest pipeline
pub struct StoreWriter {
    store: Arc<SegmentStore>,
    /// Segments kept in the window; 0 disables automatic eviction
    segment_count: usize,
}

impl StoreWriter {
    #[must_use]
    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    /// Store a new part of the segment under construction and return its id
    pub async fn append_part(&mut self, data: Bytes, duration: Duration, independent: bool) -> Result<u64> {
        let id = self.store.state.lock().next_part_id;
        let name = naming::encode(&self.store.prefix, NameKind::Part, id);
        let size = data.len();

        let handle = StorageHandle::create(Arc::clone(&self.store.storage), name.clone(), data).await?;

        let part = Arc::new(Part {
            id,
            name: name.clone(),
            duration,
            independent,
            size,
            handle,
        });

        {
            let mut state = self.store.state.lock();
            state.next_part_id = id + 1;
            state.parts_by_name.insert(name, Arc::clone(&part));
            state.next_segment_parts.push(part);
        }

        tracing::debug!(part_id = id, size, "Appended part");

        Ok(id)
    }

    /// Finalize the segment under construction and return its id.
    ///
    /// Accumulated parts move into the new segment and stay retrievable by
    /// name. When the window grows past `segment_count`, the oldest segments
    /// are evicted.
    pub async fn finalize_segment(&mut self, data: Bytes, duration: Duration) -> Result<u64> {
        let id = self.store.state.lock().next_segment_id;
        let name = naming::encode(&self.store.prefix, NameKind::Segment, id);
        let size = data.len();

        let handle = StorageHandle::create(Arc::clone(&self.store.storage), name.clone(), data).await?;

        let evicted = {
            let mut state = self.store.state.lock();
            let parts = std::mem::take(&mut state.next_segment_parts);
            let part_count = parts.len();

            let segment = Arc::new(Segment {
                id,
                name: name.clone(),
                duration,
                size,
                handle,
                parts,
            });

            state.next_segment_id = id + 1;
            state.segments_by_name.insert(name, Arc::clone(&segment));
            state.segments.push_back(segment);

            tracing::debug!(segment_id = id, size, parts = part_count, "Finalized segment");

            if self.segment_count > 0 {
                let surplus = state.segments.len().saturating_sub(self.segment_count);
                state.remove_oldest(surplus)
            } else {
                Vec::new()
            }
        };

        release(evicted).await?;

        Ok(id)
    }

    /// Evict the `n` oldest segments (fewer if the window is shorter) and
    /// return how many were removed.
    pub async fn evict_oldest(&mut self, n: usize) -> Result<usize> {
        let evicted = self.store.state.lock().remove_oldest(n);
        let count = evicted.len();

        release(evicted).await?;

        Ok(count)
    }
}

/// Release storage of evicted segments and their parts.
///
/// Every handle is attempted; the first failure is returned.
async fn release(evicted: Vec<Arc<Segment>>) -> Result<()> {
    let mut first_err = None;

    for segment in &evicted {
        let handles = std::iter::once(&segment.handle).chain(segment.parts.iter().map(|p| &p.handle));
        for handle in handles {
            if let Err(e) = handle.release().await {
                tracing::warn!("Failed to release {}: {}", handle.key(), e);
                first_err.get_or_insert(e);
            }
        }
        tracing::debug!(segment_id = segment.id, "Evicted segment");
    }

    match first_err {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
