//! Real-time archiving of detector "Stream" data as minicbf files.
//!
//! A Dectris-style detector control unit (DCU) pushes each image *series*
//! over ZeroMQ as an ordered sequence of message parts: a global header
//! carrying the detector configuration, then four parts per frame (five
//! with a site-specific appendix), then an end-of-series marker. This crate
//! receives that stream in real time, decodes the per-frame image blobs
//! (plain LZ4 or bit-shuffled LZ4), and commits one crystallography-ready
//! minicbf file per frame.
//!
//! # Architecture
//!
//! - [`Streamer`] owns the PULL socket and the receive loop: a long idle
//!   poll between series, a spin-wait receive regime inside one
//! - [`FrameSink`] is the capability the streamer drives; [`CbfSink`] is
//!   the bundled minicbf implementation
//! - [`GlobalData`] parses the per-series global header and holds the
//!   series-scoped data ([`DetectorConfig`], flatfield, pixel mask,
//!   countrate table)
//! - [`FrameBuffer`] is the owned decode buffer with the codec primitives
//!
//! # Example
//!
//! ```rust,no_run
//! use cbfstream::{CbfSink, SourceConfig, Streamer};
//!
//! fn main() -> cbfstream::Result<()> {
//!     let config = SourceConfig::default(); // tcp://localhost:9999
//!     let sink = CbfSink::new();
//!     let mut streamer = Streamer::new(sink, &config)?;
//!
//!     let handle = streamer.shutdown_handle();
//!     ctrlc_like_registration(handle.as_flag());
//!
//!     streamer.run()
//! }
//! # fn ctrlc_like_registration(_flag: std::sync::Arc<std::sync::atomic::AtomicBool>) {}
//! ```

pub mod buffer;
pub mod cbf;
pub mod codec;
pub mod config;
pub mod detector;
mod error;
pub mod global;
pub mod json;
pub mod sink;
pub mod streamer;

#[cfg(test)]
pub(crate) mod test_utils;

pub use buffer::FrameBuffer;
pub use cbf::CbfSink;
pub use codec::Compression;
pub use config::SourceConfig;
pub use detector::{DetectorConfig, HeaderDetail, Mask2D};
pub use error::{Result, StreamError};
pub use global::GlobalData;
pub use sink::FrameSink;
pub use streamer::{ShutdownHandle, Streamer};
