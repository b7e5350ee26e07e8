//! Index and retrieval core of a live low-latency HLS muxer.
//!
//! The ingest pipeline feeds segments and parts through a single
//! [`StoreWriter`]; HTTP handlers read through [`MuxerServer`], either
//! directly or via the axum router in [`http`].

pub mod config;
pub mod error;
pub mod http;
pub mod init;
pub mod logging;
pub mod muxer;
pub mod naming;
pub mod playlist;
pub mod segment;
pub mod store;

pub use config::{Config, HttpConfig, LoggingConfig, MuxerSettings, StorageConfig};
pub use error::{GenerateError, MuxerError, Result};
pub use init::{InitFileGenerator, Track};
pub use muxer::MuxerServer;
pub use naming::{NameError, NameKind};
pub use playlist::{MediaPlaylistGenerator, PlaylistGenerator, PlaylistSnapshot, Variant};
pub use segment::{Part, Segment};
pub use store::{SegmentStore, StoreWriter};
