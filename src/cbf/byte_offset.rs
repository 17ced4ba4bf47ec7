//! CBF byte-offset integer compression.
//!
//! Each element is stored as its delta from the previous element (the first
//! delta is taken from zero). Small deltas cost one byte; larger ones pay
//! for an escape marker plus a wider little-endian integer:
//!
//! | delta fits in        | encoding                                   |
//! |----------------------|--------------------------------------------|
//! | `i8` except -128     | 1 byte                                     |
//! | `i16` except -2^15   | `0x80`, then 2 bytes                       |
//! | `i32` except -2^31   | `0x80` `0x8000`, then 4 bytes              |
//! | `i64`                | `0x80` `0x8000` `0x80000000`, then 8 bytes |
//!
//! Diffraction images are dominated by near-identical neighboring pixels,
//! so the one-byte case carries almost all elements.

use crate::error::{Result, StreamError};

const ESCAPE_8: u8 = 0x80;
const ESCAPE_16: i16 = i16::MIN;
const ESCAPE_32: i32 = i32::MIN;

/// Encode a pixel sequence. The output is at worst `13 × pixels.len()`
/// bytes, in practice close to `pixels.len()`.
pub fn encode(pixels: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() + pixels.len() / 8);
    let mut prev: i64 = 0;

    for &value in pixels {
        let delta = i64::from(value) - prev;
        prev = i64::from(value);

        if (-127..=127).contains(&delta) {
            out.push(delta as i8 as u8);
        } else if (-32767..=32767).contains(&delta) {
            out.push(ESCAPE_8);
            out.extend_from_slice(&(delta as i16).to_le_bytes());
        } else if (-2_147_483_647..=2_147_483_647).contains(&delta) {
            out.push(ESCAPE_8);
            out.extend_from_slice(&ESCAPE_16.to_le_bytes());
            out.extend_from_slice(&(delta as i32).to_le_bytes());
        } else {
            out.push(ESCAPE_8);
            out.extend_from_slice(&ESCAPE_16.to_le_bytes());
            out.extend_from_slice(&ESCAPE_32.to_le_bytes());
            out.extend_from_slice(&delta.to_le_bytes());
        }
    }
    out
}

/// Decode exactly `n` elements from `data`. Trailing bytes are ignored so
/// callers can hand in a whole binary section.
pub fn decode(data: &[u8], n: usize) -> Result<Vec<i32>> {
    let mut out = Vec::with_capacity(n);
    let mut prev: i64 = 0;
    let mut pos = 0usize;

    let take = |pos: &mut usize, width: usize| -> Result<i64> {
        if *pos + width > data.len() {
            return Err(StreamError::protocol(
                "byte-offset data",
                format!("truncated stream at byte {}", *pos),
            ));
        }
        let bytes = &data[*pos..*pos + width];
        *pos += width;
        Ok(match width {
            1 => i64::from(bytes[0] as i8),
            2 => i64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            4 => i64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            _ => {
                let mut wide = [0u8; 8];
                wide.copy_from_slice(bytes);
                i64::from_le_bytes(wide)
            }
        })
    };

    while out.len() < n {
        let mut delta = take(&mut pos, 1)?;
        if delta == i64::from(i8::MIN) {
            delta = take(&mut pos, 2)?;
            if delta == i64::from(i16::MIN) {
                delta = take(&mut pos, 4)?;
                if delta == i64::from(i32::MIN) {
                    delta = take(&mut pos, 8)?;
                }
            }
        }
        prev += delta;
        out.push(prev as i32);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn small_deltas_cost_one_byte() {
        let pixels = [0, 1, 2, 3, 2, 1, 0];
        let encoded = encode(&pixels);
        assert_eq!(encoded.len(), pixels.len());
        assert_eq!(decode(&encoded, pixels.len()).unwrap(), pixels);
    }

    #[test]
    fn each_escape_level_round_trips() {
        // Consecutive values chosen so deltas land in every width class.
        let pixels = [0, 127, 0, 200, 0, 40_000, 0, 2_000_000_000, 0, i32::MIN, i32::MAX];
        let encoded = encode(&pixels);
        assert_eq!(decode(&encoded, pixels.len()).unwrap(), pixels);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let encoded = encode(&[1, 2, 3]);
        assert!(decode(&encoded[..encoded.len() - 1], 3).is_err());
        assert!(decode(&[], 1).is_err());
        // The escape marker alone promises two more bytes.
        assert!(decode(&[0x80], 1).is_err());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut encoded = encode(&[5, 6]);
        encoded.extend_from_slice(b"--trailer--");
        assert_eq!(decode(&encoded, 2).unwrap(), vec![5, 6]);
    }

    proptest! {
        #[test]
        fn prop_round_trip(pixels in prop::collection::vec(any::<i32>(), 0..4096)) {
            let encoded = encode(&pixels);
            prop_assert_eq!(decode(&encoded, pixels.len()).unwrap(), pixels);
        }
    }
}
