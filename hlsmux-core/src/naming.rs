//! Segment and part file naming.
//!
//! Names follow `<prefix>_seg<id>.mp4` and `<prefix>_part<id>.mp4`. They are
//! visible to clients through playlist URIs, so the format is part of the
//! wire protocol.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

// Compile-time constant pattern; Regex::new cannot fail on it.
static NAME_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(seg|part)(\d+)\.mp4$").expect("invalid name suffix regex"));

/// Which index a generated name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Segment,
    Part,
}

impl NameKind {
    /// Tag written between the prefix and the identifier
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Segment => "seg",
            Self::Part => "part",
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Malformed name: no ID found in '{0}'")]
    MalformedName(String),

    #[error("Malformed identifier: cannot parse ID from '{0}'")]
    MalformedIdentifier(String),
}

/// Build the file name for `id`
#[must_use]
pub fn encode(prefix: &str, kind: NameKind, id: u64) -> String {
    format!("{prefix}_{}{id}.mp4", kind.tag())
}

/// Recover kind and identifier from a generated name.
///
/// Only the trailing `_<tag><digits>.mp4` is inspected; the prefix may be
/// anything, including text that itself looks like a name.
pub fn decode(name: &str) -> Result<(NameKind, u64), NameError> {
    let caps = NAME_SUFFIX
        .captures(name)
        .ok_or_else(|| NameError::MalformedName(name.to_string()))?;

    let kind = match &caps[1] {
        "seg" => NameKind::Segment,
        _ => NameKind::Part,
    };

    let id = caps[2]
        .parse::<u64>()
        .map_err(|_| NameError::MalformedIdentifier(name.to_string()))?;

    Ok((kind, id))
}

/// Name of the initialization file for `prefix`
#[must_use]
pub fn init_file_name(prefix: &str) -> String {
    format!("{prefix}_init.mp4")
}
