//! Owned receive/decode buffer with codec primitives.
//!
//! [`FrameBuffer`] is the single allocation the per-frame pipeline decodes
//! into. Its size is the contract: `decode` fills the buffer exactly, and a
//! decoder that produces any other byte count is a fatal error. Resizing is
//! deliberately destructive (release and reallocate, never grow-and-copy) —
//! the buffer is sized once per series to the uncompressed image size and
//! stale contents must not survive a series boundary.

use crate::codec::{self, Compression};
use crate::error::{Result, StreamError};

/// A uniquely-owned, resizable byte region.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a buffer of exactly `n` bytes, zero-filled.
    pub fn new(n: usize) -> Self {
        Self { data: vec![0u8; n] }
    }

    /// An empty buffer; allocate later with [`resize`](Self::resize).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Destructive resize: a no-op when `n` equals the current size,
    /// otherwise the old region is released and `n` fresh bytes allocated.
    /// Contents after a resize are unspecified.
    pub fn resize(&mut self, n: usize) {
        if n == self.data.len() {
            return;
        }
        // Poison old contents in debug builds so stale reads show up.
        #[cfg(debug_assertions)]
        self.data.fill(b'x');
        self.data = if n == 0 { Vec::new() } else { vec![0u8; n] };
    }

    /// Release the buffer. Equivalent to `resize(0)`.
    pub fn reset(&mut self) {
        self.resize(0);
    }

    /// Decode `src` into this buffer with the given codec.
    ///
    /// The buffer length must already equal the known decoded size;
    /// `element_size` is the pixel width in bytes (4 for the supported
    /// 32-bit images) and only affects `bslz4`.
    pub fn decode(&mut self, codec: Compression, src: &[u8], element_size: usize) -> Result<()> {
        match codec {
            Compression::None => {
                if src.len() != self.data.len() {
                    return Err(StreamError::codec(
                        codec,
                        format!(
                            "pass-through blob of {} bytes does not match buffer of {} bytes",
                            src.len(),
                            self.data.len()
                        ),
                    ));
                }
                self.data.copy_from_slice(src);
                Ok(())
            }
            Compression::Lz4 => {
                let written = lz4_flex::block::decompress_into(src, &mut self.data)
                    .map_err(|e| StreamError::codec(codec, e.to_string()))?;
                if written != self.data.len() {
                    return Err(StreamError::codec(
                        codec,
                        format!("decompressed {} bytes, expected {}", written, self.data.len()),
                    ));
                }
                Ok(())
            }
            Compression::Bslz4 => {
                let consumed = codec::bitshuffle::decompress_into(src, &mut self.data, element_size)?;
                if consumed != src.len() {
                    return Err(StreamError::codec(
                        codec,
                        format!("consumed {} of {} compressed bytes", consumed, src.len()),
                    ));
                }
                Ok(())
            }
            Compression::Unknown => {
                Err(StreamError::codec(codec, "cannot decode with an unknown codec"))
            }
        }
    }

    /// Encode `src` into this buffer, growing it to the codec's upper bound
    /// first. Returns the compressed byte count, which is the valid prefix
    /// of the buffer.
    pub fn encode(&mut self, codec: Compression, src: &[u8], element_size: usize) -> Result<usize> {
        match codec {
            Compression::None => {
                if self.data.len() < src.len() {
                    self.resize(src.len());
                }
                self.data[..src.len()].copy_from_slice(src);
                Ok(src.len())
            }
            Compression::Lz4 => {
                let bound = lz4_flex::block::get_maximum_output_size(src.len());
                if self.data.len() < bound {
                    self.resize(bound);
                }
                lz4_flex::block::compress_into(src, &mut self.data)
                    .map_err(|e| StreamError::codec(codec, e.to_string()))
            }
            Compression::Bslz4 => {
                let bound = codec::bitshuffle::compress_bound(src.len(), element_size);
                if self.data.len() < bound {
                    self.resize(bound);
                }
                codec::bitshuffle::compress_into(src, &mut self.data, element_size)
            }
            Compression::Unknown => {
                Err(StreamError::codec(codec, "cannot encode with an unknown codec"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn resize_semantics() {
        let mut buf = FrameBuffer::new(16);
        assert_eq!(buf.len(), 16);

        buf.resize(16); // same size: no-op
        assert_eq!(buf.len(), 16);

        buf.resize(32);
        assert_eq!(buf.len(), 32);

        buf.reset();
        assert!(buf.is_empty());
    }

    #[test]
    fn pass_through_requires_exact_size() {
        let mut buf = FrameBuffer::new(4);
        assert!(buf.decode(Compression::None, b"wxyz", 4).is_ok());
        assert_eq!(buf.as_slice(), b"wxyz");

        let err = buf.decode(Compression::None, b"too long for four", 4).unwrap_err();
        assert!(matches!(err, StreamError::Codec { codec: Compression::None, .. }));
    }

    #[test]
    fn unknown_codec_is_fatal() {
        let mut buf = FrameBuffer::new(4);
        assert!(buf.decode(Compression::Unknown, b"data", 4).is_err());
        assert!(buf.encode(Compression::Unknown, b"data", 4).is_err());
    }

    #[test]
    fn lz4_length_mismatch_is_fatal() {
        let mut scratch = FrameBuffer::empty();
        let compressed_len = scratch.encode(Compression::Lz4, &[0u8; 256], 4).unwrap();
        let compressed = scratch.as_slice()[..compressed_len].to_vec();

        // Decoding into a buffer of the wrong size must fail, not truncate.
        let mut wrong = FrameBuffer::new(255);
        assert!(wrong.decode(Compression::Lz4, &compressed, 4).is_err());

        let mut right = FrameBuffer::new(256);
        right.decode(Compression::Lz4, &compressed, 4).unwrap();
        assert_eq!(right.as_slice(), &[0u8; 256]);
    }

    proptest! {
        /// decode(encode(src)) == src for every codec, byte for byte.
        #[test]
        fn prop_codec_round_trip(
            pixels in prop::collection::vec(any::<u32>(), 1..2000),
            codec in prop::sample::select(vec![
                Compression::None,
                Compression::Lz4,
                Compression::Bslz4,
            ])
        ) {
            let src: Vec<u8> = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();

            let mut scratch = FrameBuffer::empty();
            let compressed_len = scratch.encode(codec, &src, 4).unwrap();
            let compressed = &scratch.as_slice()[..compressed_len];

            let mut out = FrameBuffer::new(src.len());
            out.decode(codec, compressed, 4).unwrap();
            prop_assert_eq!(out.as_slice(), &src[..]);
        }
    }
}
