use hlsmux_storage::StorageHandle;
use std::time::Duration;

/// Low-latency sub-unit of the segment under construction
#[derive(Debug, Clone)]
pub struct Part {
    pub id: u64,
    /// Generated file name (`<prefix>_part<id>.mp4`)
    pub name: String,
    pub duration: Duration,
    /// Starts with an independent (key) frame
    pub independent: bool,
    pub size: usize,
    pub handle: StorageHandle,
}

/// Finalized media segment
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: u64,
    /// Generated file name (`<prefix>_seg<id>.mp4`)
    pub name: String,
    pub duration: Duration,
    pub size: usize,
    pub handle: StorageHandle,
    /// Parts the segment was assembled from, in production order
    pub parts: Vec<std::sync::Arc<Part>>,
}
