//! Run-delta ("SCN") frame codec.
//!
//! Used by the scene sprite sheets: each frame is encoded independently as
//! a sequence of `(count, value)` byte pairs emitting `count` copies of
//! `value`, walked row by row. A pair with `count == 0` is the line-wrap
//! marker: the remainder of the current row is filled with index 0 and the
//! cursor advances to the next row.
//!
//! Frames whose pixels all fit a nibble are stored in 4-bit mode, where
//! runs are capped at 15 so every stored byte is <= 0x0F. A frame with any
//! pixel above 0x0F is promoted whole to 8-bit mode (runs capped at 255),
//! which necessarily stores that pixel as a byte above 0x0F. Sniffing the
//! encoded range for any byte above 0x0F therefore recovers the bit depth
//! exactly; the stored stream parses the same way in both modes.

use crate::error::{CodecError, CodecResult};

const NIBBLE_MAX_RUN: usize = 0x0F;
const BYTE_MAX_RUN: usize = 0xFF;

/// Bit depth of an encoded frame, recovered by scanning the byte range.
pub fn detect_depth(encoded: &[u8]) -> usize {
    if encoded.iter().any(|&b| b > 0x0F) {
        8
    } else {
        4
    }
}

/// Encode one frame of flat 8bpp pixels. Returns the stream and the bit
/// depth it was stored at (4 or 8).
pub fn encode_frame(flat: &[u8], width: usize, height: usize) -> CodecResult<(Vec<u8>, usize)> {
    if flat.len() != width * height {
        return Err(CodecError::integrity(format!(
            "SCN encode expected {} pixels, got {}",
            width * height,
            flat.len()
        )));
    }

    let depth = if flat.iter().any(|&p| p > 0x0F) { 8 } else { 4 };
    let max_run = if depth == 8 { BYTE_MAX_RUN } else { NIBBLE_MAX_RUN };
    let mut out = Vec::with_capacity(flat.len() / 2 + height * 2);

    for row in flat.chunks(width.max(1)) {
        if width == 0 {
            break;
        }
        let mut x = 0;
        while x < width {
            let value = row[x];
            let mut run = 1;
            while x + run < width && row[x + run] == value && run < max_run {
                run += 1;
            }
            if value == 0 && x + run == width {
                // Trailing zeros compress to the line-wrap marker.
                out.push(0);
                out.push(0);
            } else {
                out.push(run as u8);
                out.push(value);
            }
            x += run;
        }
    }

    Ok((out, depth))
}

/// Decode the byte range of one frame back into exactly `width * height`
/// flat pixels. Overrunning the frame, ending mid-row without a wrap
/// marker, or leaving rows unfilled is an integrity error.
pub fn decode_frame(encoded: &[u8], width: usize, height: usize) -> CodecResult<Vec<u8>> {
    let expected = width * height;
    // The frame size comes from an untrusted header. A run pair emits at
    // most 255 pixels and a wrap pair at most one row, so a stream too
    // short to ever fill the frame is rejected before reserving output.
    let most = (encoded.len() / 2).saturating_mul(width.max(BYTE_MAX_RUN));
    if most < expected {
        return Err(CodecError::integrity(format!(
            "SCN stream of {} bytes cannot fill a {}x{} frame",
            encoded.len(),
            width,
            height
        )));
    }

    let mut out = Vec::with_capacity(expected);
    let mut x = 0;
    let mut pos = 0;

    while pos < encoded.len() {
        if pos + 1 >= encoded.len() {
            return Err(CodecError::integrity(
                "SCN stream ends in the middle of a run pair",
            ));
        }
        let count = encoded[pos] as usize;
        let value = encoded[pos + 1];
        pos += 2;

        if count == 0 {
            // Line wrap: zero-fill to the end of the current row.
            out.extend(std::iter::repeat(0u8).take(width - x));
            x = 0;
        } else {
            if x + count > width {
                return Err(CodecError::integrity(format!(
                    "SCN run of {} at column {} crosses the row boundary ({} wide)",
                    count, x, width
                )));
            }
            out.extend(std::iter::repeat(value).take(count));
            x += count;
            if x == width {
                x = 0;
            }
        }

        if out.len() > width * height {
            return Err(CodecError::integrity(format!(
                "SCN frame overruns {}x{} pixels",
                width, height
            )));
        }
    }

    if out.len() != width * height || x != 0 {
        return Err(CodecError::integrity(format!(
            "SCN frame decoded {} of {} pixels",
            out.len(),
            width * height
        )));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_frame_round_trips_and_stays_below_0x10() {
        let flat = vec![
            0, 0, 1, 1, //
            2, 2, 2, 0, //
            0, 0, 0, 0, //
        ];
        let (encoded, depth) = encode_frame(&flat, 4, 3).unwrap();
        assert_eq!(depth, 4);
        assert!(encoded.iter().all(|&b| b <= 0x0F));
        assert_eq!(detect_depth(&encoded), 4);
        assert_eq!(decode_frame(&encoded, 4, 3).unwrap(), flat);
    }

    #[test]
    fn pixel_above_nibble_range_promotes_frame_to_8bit() {
        let flat = vec![0u8, 0x10, 0x10, 0, 7, 7, 7, 7];
        let (encoded, depth) = encode_frame(&flat, 4, 2).unwrap();
        assert_eq!(depth, 8);
        assert_eq!(detect_depth(&encoded), 8);
        assert_eq!(decode_frame(&encoded, 4, 2).unwrap(), flat);
    }

    #[test]
    fn trailing_zero_rows_use_wrap_markers() {
        let flat = vec![3, 0, 0, 0, 0, 0, 0, 0];
        let (encoded, _) = encode_frame(&flat, 4, 2).unwrap();
        // Row 0: run(1,3) + wrap; row 1: wrap only.
        assert_eq!(encoded, vec![1, 3, 0, 0, 0, 0]);
        assert_eq!(decode_frame(&encoded, 4, 2).unwrap(), flat);
    }

    #[test]
    fn long_nibble_runs_split_at_15() {
        let flat = vec![5u8; 40];
        let (encoded, depth) = encode_frame(&flat, 40, 1).unwrap();
        assert_eq!(depth, 4);
        assert_eq!(encoded, vec![15, 5, 15, 5, 10, 5]);
        assert_eq!(decode_frame(&encoded, 40, 1).unwrap(), flat);
    }

    #[test]
    fn incomplete_frame_is_rejected() {
        // One run pair covering 2 of 4 pixels, no wrap marker.
        assert!(decode_frame(&[2, 9], 4, 1).is_err());
        // Run crossing the row boundary.
        assert!(decode_frame(&[5, 9], 4, 1).is_err());
        // Dangling half pair.
        assert!(decode_frame(&[2, 9, 3], 4, 1).is_err());
    }

    #[test]
    fn overlong_stream_is_rejected() {
        assert!(decode_frame(&[4, 1, 4, 1], 4, 1).is_err());
    }

    #[test]
    fn declared_frame_far_larger_than_stream_is_rejected_up_front() {
        // Two pairs can never fill 0xFFFF x 0xFFFF pixels.
        let err = decode_frame(&[1, 2, 1, 3], 0xFFFF, 0xFFFF).unwrap_err();
        assert!(matches!(err, CodecError::Integrity { .. }));
    }
}
