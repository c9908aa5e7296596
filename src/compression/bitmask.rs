//! Bitmask codec.
//!
//! A sibling per-title scheme for sparse sprite data: one mask byte covers
//! up to eight output bytes, most significant bit first. A set bit consumes
//! one literal byte from the stream; a clear bit emits index 0. Unlike the
//! RLE codec this one is strict: a stream that cannot fill the declared
//! length is an integrity error.

use crate::error::{CodecError, CodecResult};

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 1);

    for group in data.chunks(8) {
        let mut mask = 0u8;
        for (bit, &byte) in group.iter().enumerate() {
            if byte != 0 {
                mask |= 1 << (7 - bit);
            }
        }
        out.push(mask);
        out.extend(group.iter().filter(|&&byte| byte != 0));
    }

    out
}

pub fn decode(data: &[u8], declared_len: usize) -> CodecResult<Vec<u8>> {
    let mut out = Vec::with_capacity(declared_len);
    let mut pos = 0;

    while out.len() < declared_len {
        if pos >= data.len() {
            return Err(CodecError::integrity(format!(
                "bitmask stream exhausted after {} of {} declared bytes",
                out.len(),
                declared_len
            )));
        }
        let mask = data[pos];
        pos += 1;

        for bit in 0..8 {
            if out.len() == declared_len {
                if mask << bit != 0 {
                    return Err(CodecError::integrity(
                        "bitmask byte promises literals past the declared length",
                    ));
                }
                break;
            }
            if mask & (1 << (7 - bit)) != 0 {
                if pos >= data.len() {
                    return Err(CodecError::integrity(
                        "bitmask stream ends before a promised literal",
                    ));
                }
                out.push(data[pos]);
                pos += 1;
            } else {
                out.push(0);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_data_round_trip() {
        let data = [0u8, 0, 7, 0, 0, 0, 9, 0, 0, 0, 0, 1];
        let encoded = encode(&data);
        // First group: bits for positions 2 and 6; second group: position 3.
        assert_eq!(encoded, vec![0b0010_0010, 7, 9, 0b0001_0000, 1]);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn dense_data_round_trip() {
        let data: Vec<u8> = (1..=20u8).collect();
        let encoded = encode(&data);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn all_zero_run_is_one_mask_byte_per_group() {
        let data = [0u8; 16];
        let encoded = encode(&data);
        assert_eq!(encoded, vec![0, 0]);
        assert_eq!(decode(&encoded, 16).unwrap(), data);
    }

    #[test]
    fn truncated_literal_stream_fails() {
        assert!(decode(&[0b1100_0000, 5], 8).is_err());
        assert!(decode(&[], 1).is_err());
    }

    #[test]
    fn trailing_promised_literals_fail() {
        // Declared length 2, but the mask sets a bit in position 3.
        assert!(decode(&[0b0001_0000, 1], 2).is_err());
    }
}
