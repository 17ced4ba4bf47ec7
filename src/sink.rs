//! The frame-sink capability.
//!
//! A frame sink is any component that consumes raw stream message parts and
//! turns completed frames into some output format. The bundled
//! [`CbfSink`](crate::cbf::CbfSink) writes minicbf files; alternative
//! implementations (HDF5 archives, in-memory viewers) plug into the same
//! [`Streamer`](crate::streamer::Streamer) without touching the transport
//! code — the streamer is generic over this trait and monomorphised at
//! build time.

use crate::error::Result;

/// Consumer of stream message parts.
pub trait FrameSink {
    /// Consume one message part.
    ///
    /// Returns:
    /// - `Ok(true)` — this part completed an entire image series; the sink
    ///   has already returned itself to the global-header state
    /// - `Ok(false)` — more parts are expected
    /// - `Err(e)` — protocol violation, codec failure, or output failure;
    ///   none of these are recoverable mid-series
    ///
    /// The buffer behind `data` is reused for the next receive, so
    /// implementations must copy anything they keep before returning.
    fn parse(&mut self, data: &[u8]) -> Result<bool>;

    /// Commit all parsed data for the current frame to the destination.
    ///
    /// Sinks may call this on themselves eagerly (the minicbf sink flushes
    /// once per frame); the trait accommodates both eager and deferred
    /// writers.
    fn flush(&mut self) -> Result<()>;

    /// Drop all per-series state and return to expecting a global header.
    fn reset(&mut self);
}
