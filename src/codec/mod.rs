//! Image compression codecs.
//!
//! The DCU compresses per-frame pixel data with one of two schemes, both
//! negotiated once per series through the detector configuration:
//!
//! - `lz4` — a single plain LZ4 block (no frame header, no length prefix)
//! - `bslz4` — bit-shuffled LZ4: fixed-width elements are bit-transposed so
//!   that their nth bits are grouped together, then compressed as a sequence
//!   of independent LZ4 blocks (see [`bitshuffle`])
//!
//! `none` passes pixel data through untouched. The codec names here are the
//! exact lower-case strings used on the wire.

pub mod bitshuffle;

use std::fmt;

use serde::{Deserialize, Serialize};

/// The compression scheme applied to opaque image blobs.
///
/// `Unknown` never appears on the wire; it is the parse result for an
/// unrecognized name and is rejected wherever a codec is actually applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Unknown,
    None,
    Lz4,
    Bslz4,
}

impl Compression {
    /// Parse a wire name. Unrecognized names map to `Unknown` so the caller
    /// can produce an error naming the offending value.
    pub fn from_name(name: &str) -> Self {
        match name {
            "none" => Compression::None,
            "lz4" => Compression::Lz4,
            "bslz4" => Compression::Bslz4,
            _ => Compression::Unknown,
        }
    }

    /// The lower-case wire name of this codec.
    pub fn name(&self) -> &'static str {
        match self {
            Compression::Unknown => "unknown",
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::Bslz4 => "bslz4",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
