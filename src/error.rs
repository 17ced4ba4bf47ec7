//! Error types for stream processing.
//!
//! All fallible operations in this crate return [`Result`], carrying a
//! [`StreamError`] that names the failure kind and the offending field or
//! value. The taxonomy follows the failure modes of the wire protocol:
//!
//! - **Protocol violations**: wrong `htype`, missing mandatory JSON fields,
//!   shape/size mismatches, series-id mismatches
//! - **Codec failures**: a decompressor rejected its input or produced the
//!   wrong number of bytes
//! - **Sink failures**: the output file could not be created or written
//! - **Transport failures**: the socket returned a hard error
//!
//! A malformed series leaves the per-frame metadata ambiguous, so none of
//! these are recoverable in-band: the streamer fails fast and the process
//! reports the error and exits nonzero. Spurious empty receives and
//! cooperative shutdown are *not* errors and never surface here.

use std::path::PathBuf;
use thiserror::Error;

use crate::codec::Compression;

/// Result type alias for stream operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for stream ingestion and conversion.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("protocol violation in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("the DCU did not provide a valid value for \"{field}\"")]
    MissingField { field: String },

    #[error("series id mismatch: expected {expected}, received {received}")]
    SeriesMismatch { expected: i64, received: i64 },

    #[error("bit_depth_image={found}: only 32-bit depth images are supported")]
    UnsupportedBitDepth { found: i64 },

    #[error("{codec} codec failed: {details}")]
    Codec { codec: Compression, details: String },

    #[error("malformed JSON message part")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("output file error: {path}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error during {context}")]
    Transport {
        context: String,
        #[source]
        source: zmq::Error,
    },

    #[error("I/O error during {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {details}")]
    Config { details: String },
}

impl StreamError {
    /// Helper constructor for protocol violations.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for missing or ill-typed mandatory fields.
    pub fn missing_field(field: impl Into<String>) -> Self {
        StreamError::MissingField { field: field.into() }
    }

    /// Helper constructor for codec failures.
    pub fn codec(codec: Compression, details: impl Into<String>) -> Self {
        StreamError::Codec { codec, details: details.into() }
    }

    /// Helper constructor for output-file failures.
    pub fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StreamError::Sink { path: path.into(), source }
    }

    /// Helper constructor for socket failures.
    pub fn transport(context: impl Into<String>, source: zmq::Error) -> Self {
        StreamError::Transport { context: context.into(), source }
    }

    /// Helper constructor for startup I/O failures.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Io { context: context.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        StreamError::Config { details: details.into() }
    }
}
