//! Bit-shuffled LZ4 block transform.
//!
//! The `bslz4` scheme rearranges fixed-width elements before compression so
//! that bit 0 of every element lands in one run of bytes, bit 1 in the next,
//! and so on. Detector pixels mostly differ in their low bits, so the
//! transposed layout produces long zero runs that LZ4 compresses far better
//! than the raw pixel stream.
//!
//! Wire format: the element stream is split into blocks (targeting
//! [`TARGET_BLOCK_BYTES`] per block, rounded down to a multiple of eight
//! elements). Each block is emitted as a 4-byte big-endian compressed length
//! followed by one LZ4 block of the transposed data. Trailing elements that
//! do not fill a group of eight are appended verbatim, uncompressed.
//!
//! Decompression returns the number of *compressed* bytes consumed; the
//! caller checks that against the received blob length to detect trailing
//! garbage or truncation.

use crate::codec::Compression;
use crate::error::{Result, StreamError};

/// Uncompressed payload size each block aims for, in bytes.
pub const TARGET_BLOCK_BYTES: usize = 8192;

/// Elements gathered into one byte of a bit plane.
const GROUP: usize = 8;

/// Number of elements per full block for a given element width.
pub fn default_block_elems(elem_size: usize) -> usize {
    let elems = TARGET_BLOCK_BYTES / elem_size.max(1);
    (elems & !(GROUP - 1)).max(GROUP)
}

/// Upper bound on the compressed size of `src_len` bytes of `elem_size`-wide
/// elements. Destination buffers grown to this bound never overflow.
pub fn compress_bound(src_len: usize, elem_size: usize) -> usize {
    let n = src_len / elem_size.max(1);
    let block = default_block_elems(elem_size);
    let full = n / block;
    let rem = n % block;
    let last = rem & !(GROUP - 1);
    let leftover_bytes = (rem - last) * elem_size;

    let mut bound = full * (4 + lz4_flex::block::get_maximum_output_size(block * elem_size));
    if last > 0 {
        bound += 4 + lz4_flex::block::get_maximum_output_size(last * elem_size);
    }
    bound + leftover_bytes
}

/// Compress `src` into `dst`, returning the number of bytes written.
///
/// `src.len()` must be a multiple of `elem_size`, and `dst` must be at least
/// [`compress_bound`] bytes long.
pub fn compress_into(src: &[u8], dst: &mut [u8], elem_size: usize) -> Result<usize> {
    if elem_size == 0 || src.len() % elem_size != 0 {
        return Err(StreamError::codec(
            Compression::Bslz4,
            format!("input of {} bytes is not a multiple of element size {}", src.len(), elem_size),
        ));
    }

    let n = src.len() / elem_size;
    let block = default_block_elems(elem_size);
    let mut scratch = vec![0u8; block * elem_size];
    let mut read = 0usize;
    let mut written = 0usize;
    let mut remaining = n;

    while remaining >= GROUP {
        let block_elems = remaining.min(block) & !(GROUP - 1);
        let block_bytes = block_elems * elem_size;
        shuffle_block(&src[read..read + block_bytes], elem_size, &mut scratch[..block_bytes]);

        let payload = lz4_flex::block::compress_into(
            &scratch[..block_bytes],
            &mut dst[written + 4..],
        )
        .map_err(|e| StreamError::codec(Compression::Bslz4, e.to_string()))?;
        dst[written..written + 4].copy_from_slice(&(payload as u32).to_be_bytes());

        read += block_bytes;
        written += 4 + payload;
        remaining -= block_elems;
    }

    // Elements that do not fill a group of eight are stored raw.
    let tail = src.len() - read;
    dst[written..written + tail].copy_from_slice(&src[read..]);
    Ok(written + tail)
}

/// Decompress `src` into `dst`, filling it completely.
///
/// `dst.len()` must equal the known decoded size and be a multiple of
/// `elem_size`. Returns the number of compressed bytes consumed.
pub fn decompress_into(src: &[u8], dst: &mut [u8], elem_size: usize) -> Result<usize> {
    if elem_size == 0 || dst.len() % elem_size != 0 {
        return Err(StreamError::codec(
            Compression::Bslz4,
            format!(
                "output of {} bytes is not a multiple of element size {}",
                dst.len(),
                elem_size
            ),
        ));
    }

    let n = dst.len() / elem_size;
    let block = default_block_elems(elem_size);
    let mut scratch = vec![0u8; block * elem_size];
    let mut consumed = 0usize;
    let mut filled = 0usize;
    let mut remaining = n;

    while remaining >= GROUP {
        let block_elems = remaining.min(block) & !(GROUP - 1);
        let block_bytes = block_elems * elem_size;

        if consumed + 4 > src.len() {
            return Err(StreamError::codec(Compression::Bslz4, "truncated block header"));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&src[consumed..consumed + 4]);
        let payload = u32::from_be_bytes(len_bytes) as usize;
        consumed += 4;
        if consumed + payload > src.len() {
            return Err(StreamError::codec(
                Compression::Bslz4,
                format!("block of {} bytes extends past end of input", payload),
            ));
        }

        let decoded = lz4_flex::block::decompress_into(
            &src[consumed..consumed + payload],
            &mut scratch[..block_bytes],
        )
        .map_err(|e| StreamError::codec(Compression::Bslz4, e.to_string()))?;
        if decoded != block_bytes {
            return Err(StreamError::codec(
                Compression::Bslz4,
                format!("block decoded to {} bytes, expected {}", decoded, block_bytes),
            ));
        }

        unshuffle_block(&scratch[..block_bytes], elem_size, &mut dst[filled..filled + block_bytes]);
        consumed += payload;
        filled += block_bytes;
        remaining -= block_elems;
    }

    let tail = dst.len() - filled;
    if consumed + tail > src.len() {
        return Err(StreamError::codec(Compression::Bslz4, "truncated trailing elements"));
    }
    dst[filled..].copy_from_slice(&src[consumed..consumed + tail]);
    Ok(consumed + tail)
}

/// Bit-transpose one block: `dst[plane][k]` gathers bit `plane % 8` of byte
/// `plane / 8` from elements `8k..8k+8`.
fn shuffle_block(src: &[u8], elem_size: usize, dst: &mut [u8]) {
    let n = src.len() / elem_size;
    debug_assert_eq!(n % GROUP, 0);
    let plane_bytes = n / GROUP;

    for plane in 0..elem_size * 8 {
        let byte_in_elem = plane / 8;
        let bit_in_byte = plane % 8;
        for k in 0..plane_bytes {
            let mut gathered = 0u8;
            for i in 0..GROUP {
                let elem = GROUP * k + i;
                let bit = (src[elem * elem_size + byte_in_elem] >> bit_in_byte) & 1;
                gathered |= bit << i;
            }
            dst[plane * plane_bytes + k] = gathered;
        }
    }
}

/// Inverse of [`shuffle_block`].
fn unshuffle_block(src: &[u8], elem_size: usize, dst: &mut [u8]) {
    let n = dst.len() / elem_size;
    debug_assert_eq!(n % GROUP, 0);
    let plane_bytes = n / GROUP;

    dst.fill(0);
    for plane in 0..elem_size * 8 {
        let byte_in_elem = plane / 8;
        let bit_in_byte = plane % 8;
        for k in 0..plane_bytes {
            let gathered = src[plane * plane_bytes + k];
            for i in 0..GROUP {
                if (gathered >> i) & 1 != 0 {
                    let elem = GROUP * k + i;
                    dst[elem * elem_size + byte_in_elem] |= 1u8 << bit_in_byte;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(src: &[u8], elem_size: usize) -> Vec<u8> {
        let mut compressed = vec![0u8; compress_bound(src.len(), elem_size)];
        let clen = compress_into(src, &mut compressed, elem_size).unwrap();

        let mut decoded = vec![0u8; src.len()];
        let consumed = decompress_into(&compressed[..clen], &mut decoded, elem_size).unwrap();
        assert_eq!(consumed, clen, "decoder must consume the whole compressed stream");
        decoded
    }

    #[test]
    fn shuffle_is_a_bijection() {
        let src: Vec<u8> = (0u8..=255).collect();
        let mut shuffled = vec![0u8; src.len()];
        let mut back = vec![0u8; src.len()];
        shuffle_block(&src, 4, &mut shuffled);
        unshuffle_block(&shuffled, 4, &mut back);
        assert_eq!(src, back);
        assert_ne!(src, shuffled);
    }

    #[test]
    fn empty_input_round_trips() {
        assert_eq!(round_trip(&[], 4), Vec::<u8>::new());
    }

    #[test]
    fn sub_group_tail_is_stored_raw() {
        // 3 elements of 4 bytes: fewer than one group of 8, so no block is
        // emitted and the bytes pass through verbatim.
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let mut compressed = vec![0u8; compress_bound(src.len(), 4)];
        let clen = compress_into(&src, &mut compressed, 4).unwrap();
        assert_eq!(clen, src.len());
        assert_eq!(&compressed[..clen], &src);
    }

    #[test]
    fn constant_data_compresses_well() {
        let src = vec![0x77u8; 4 * 4096]; // two full blocks at elem_size 4
        let mut compressed = vec![0u8; compress_bound(src.len(), 4)];
        let clen = compress_into(&src, &mut compressed, 4).unwrap();
        assert!(clen < src.len() / 10, "constant data should shrink, got {} bytes", clen);
        assert_eq!(round_trip(&src, 4), src);
    }

    #[test]
    fn misaligned_input_is_rejected() {
        let mut dst = vec![0u8; 64];
        assert!(compress_into(&[0u8; 7], &mut dst, 4).is_err());
        let mut out = vec![0u8; 7];
        assert!(decompress_into(&[0u8; 4], &mut out, 4).is_err());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let src = vec![0xABu8; 4 * 64];
        let mut compressed = vec![0u8; compress_bound(src.len(), 4)];
        let clen = compress_into(&src, &mut compressed, 4).unwrap();

        let mut decoded = vec![0u8; src.len()];
        assert!(decompress_into(&compressed[..clen - 1], &mut decoded, 4).is_err());
        assert!(decompress_into(&compressed[..2], &mut decoded, 4).is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip_u32_elements(pixels in prop::collection::vec(any::<u32>(), 0..5000)) {
            let src: Vec<u8> = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
            prop_assert_eq!(round_trip(&src, 4), src);
        }

        #[test]
        fn prop_round_trip_narrow_elements(
            bytes in prop::collection::vec(any::<u8>(), 0..2048),
            elem_size in prop::sample::select(vec![1usize, 2])
        ) {
            let len = bytes.len() - bytes.len() % elem_size;
            let src = &bytes[..len];
            prop_assert_eq!(round_trip(src, elem_size), src);
        }

        #[test]
        fn prop_compressed_size_within_bound(pixels in prop::collection::vec(any::<u32>(), 0..5000)) {
            let src: Vec<u8> = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
            let mut compressed = vec![0u8; compress_bound(src.len(), 4)];
            let clen = compress_into(&src, &mut compressed, 4).unwrap();
            prop_assert!(clen <= compressed.len());
        }
    }
}
