//! Media playlist generation.
//!
//! Generators are pure functions of a [`PlaylistSnapshot`] taken by the
//! store under a single lock acquisition.

use crate::error::GenerateError;
use crate::naming::{self, NameKind};
use crate::segment::{Part, Segment};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

/// Segments whose parts are still listed in a low-latency playlist
const SEGMENTS_WITH_PARTS: usize = 2;

/// Flavor of media playlist served to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Fragmented MP4 segments only
    Fmp4,
    /// Fragmented MP4 with partial segments, blocking reload and delta updates
    #[default]
    LowLatency,
}

/// Consistent view of the store at one instant
#[derive(Debug, Clone)]
pub struct PlaylistSnapshot {
    pub segments: Vec<Arc<Segment>>,
    /// Parts of the segment under construction
    pub parts: Vec<Arc<Part>>,
    pub next_part_id: u64,
    /// Segments dropped from the window since the session started
    pub delete_count: u64,
    pub prefix: String,
}

pub trait PlaylistGenerator: Send + Sync {
    fn generate(
        &self,
        is_delta_update: bool,
        variant: Variant,
        snapshot: &PlaylistSnapshot,
    ) -> Result<Bytes, GenerateError>;
}

/// Default generator producing HLS media playlist text
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaPlaylistGenerator;

impl PlaylistGenerator for MediaPlaylistGenerator {
    fn generate(
        &self,
        is_delta_update: bool,
        variant: Variant,
        snapshot: &PlaylistSnapshot,
    ) -> Result<Bytes, GenerateError> {
        let content = match variant {
            Variant::Fmp4 => generate_fmp4(snapshot),
            Variant::LowLatency => generate_low_latency(is_delta_update, snapshot),
        };
        Ok(Bytes::from(content))
    }
}

/// Max segment duration in whole seconds, rounded up
fn target_duration(segments: &[Arc<Segment>]) -> u64 {
    segments
        .iter()
        .map(|s| s.duration.as_millis().div_ceil(1000) as u64)
        .max()
        .unwrap_or(1)
        .max(1)
}

/// Max part duration over everything still listed, `None` while no part
/// with a duration has been produced
fn part_target_duration(snapshot: &PlaylistSnapshot) -> Option<Duration> {
    snapshot
        .segments
        .iter()
        .flat_map(|s| s.parts.iter())
        .chain(snapshot.parts.iter())
        .map(|p| p.duration)
        .max()
        .filter(|d| !d.is_zero())
}

/// Number of leading segments a delta update may omit: those lying entirely
/// beyond six target durations from the end of the playlist.
fn skipped_segments(segments: &[Arc<Segment>], target_duration: u64) -> usize {
    let boundary = Duration::from_secs(target_duration * 6);
    let mut covered = Duration::ZERO;
    let mut kept = 0;

    for segment in segments.iter().rev() {
        if covered >= boundary {
            break;
        }
        covered += segment.duration;
        kept += 1;
    }

    segments.len() - kept
}

fn write_header(out: &mut String, version: u8, target_duration: u64) {
    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(out, "#EXT-X-VERSION:{version}");
    let _ = writeln!(out, "#EXT-X-INDEPENDENT-SEGMENTS");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{target_duration}");
}

fn write_segment(out: &mut String, segment: &Segment) {
    let _ = writeln!(out, "#EXTINF:{:.5},", segment.duration.as_secs_f64());
    let _ = writeln!(out, "{}", segment.name);
}

fn write_part(out: &mut String, part: &Part) {
    let _ = write!(
        out,
        "#EXT-X-PART:DURATION={:.5},URI=\"{}\"",
        part.duration.as_secs_f64(),
        part.name
    );
    if part.independent {
        let _ = write!(out, ",INDEPENDENT=YES");
    }
    let _ = writeln!(out);
}

fn generate_fmp4(snapshot: &PlaylistSnapshot) -> String {
    let mut out = String::new();

    write_header(&mut out, 7, target_duration(&snapshot.segments));
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", snapshot.delete_count);
    let _ = writeln!(out, "#EXT-X-MAP:URI=\"{}\"", naming::init_file_name(&snapshot.prefix));

    for segment in &snapshot.segments {
        write_segment(&mut out, segment);
    }

    out
}

fn generate_low_latency(is_delta_update: bool, snapshot: &PlaylistSnapshot) -> String {
    let mut out = String::new();
    let target = target_duration(&snapshot.segments);
    let part_target = part_target_duration(snapshot).map(|d| d.as_secs_f64());
    let skip_until = target * 6;

    write_header(&mut out, 9, target);

    // Part attributes are only advertised once parts exist
    match part_target {
        Some(part_target) => {
            let _ = writeln!(
                out,
                "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK={:.5},CAN-SKIP-UNTIL={skip_until}",
                part_target * 2.5
            );
            let _ = writeln!(out, "#EXT-X-PART-INF:PART-TARGET={part_target:.5}");
        }
        None => {
            let _ = writeln!(
                out,
                "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,CAN-SKIP-UNTIL={skip_until}"
            );
        }
    }
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", snapshot.delete_count);

    let skipped = if is_delta_update {
        skipped_segments(&snapshot.segments, target)
    } else {
        0
    };

    if skipped > 0 {
        let _ = writeln!(out, "#EXT-X-SKIP:SKIPPED-SEGMENTS={skipped}");
    } else {
        let _ = writeln!(out, "#EXT-X-MAP:URI=\"{}\"", naming::init_file_name(&snapshot.prefix));
    }

    let total = snapshot.segments.len();
    for (i, segment) in snapshot.segments.iter().enumerate().skip(skipped) {
        if total - i <= SEGMENTS_WITH_PARTS {
            for part in &segment.parts {
                write_part(&mut out, part);
            }
        }
        write_segment(&mut out, segment);
    }

    for part in &snapshot.parts {
        write_part(&mut out, part);
    }

    if part_target.is_some() {
        let _ = writeln!(
            out,
            "#EXT-X-PRELOAD-HINT:TYPE=PART,URI=\"{}\"",
            naming::encode(&snapshot.prefix, NameKind::Part, snapshot.next_part_id)
        );
    }

    out
}
