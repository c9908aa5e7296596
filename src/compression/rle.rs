//! Flag-based run-length codec.
//!
//! Each control byte's high bit selects the mode: set means "repeat run"
//! (low 7 bits = count, one value byte follows), clear means "literal run"
//! (low 7 bits = count, that many literal bytes follow). Runs never exceed
//! 127 bytes per control byte.
//!
//! Decoding is the one deliberately tolerant codec in the crate: a run that
//! would overrun the declared output is clipped and trailing input past a
//! full output is ignored, because shipped game data contains both. Input
//! that ends *before* the output is full still surfaces as a declared
//! length mismatch at the compressed-block layer.

use tracing::warn;

pub const REPEAT_FLAG: u8 = 0x80;
pub const MAX_RUN: usize = 0x7F;

/// Default minimum length for emitting a repeat run.
pub const DEFAULT_MINIMUM_REPEATING: usize = 3;

pub fn encode(data: &[u8]) -> Vec<u8> {
    encode_with_threshold(data, DEFAULT_MINIMUM_REPEATING)
}

/// Encode with a configurable repeat threshold. Values below 2 are clamped
/// to 2; a 1-byte "run" costs more than the literal it replaces.
pub fn encode_with_threshold(data: &[u8], minimum_repeating: usize) -> Vec<u8> {
    let minimum_repeating = minimum_repeating.max(2);
    let mut out = Vec::with_capacity(data.len() / 2 + 8);
    let mut literal_start = 0;
    let mut pos = 0;

    while pos < data.len() {
        let mut run_len = 1;
        while pos + run_len < data.len()
            && data[pos + run_len] == data[pos]
            && run_len < MAX_RUN
        {
            run_len += 1;
        }

        if run_len >= minimum_repeating {
            flush_literals(&mut out, &data[literal_start..pos]);
            out.push(REPEAT_FLAG | run_len as u8);
            out.push(data[pos]);
            pos += run_len;
            literal_start = pos;
        } else {
            pos += run_len;
        }
    }

    flush_literals(&mut out, &data[literal_start..]);
    out
}

fn flush_literals(out: &mut Vec<u8>, literals: &[u8]) {
    for block in literals.chunks(MAX_RUN) {
        out.push(block.len() as u8);
        out.extend_from_slice(block);
    }
}

/// Best-effort decode of up to `declared_len` bytes.
///
/// Never overruns the output; may return fewer bytes than declared when the
/// input is exhausted mid-stream. The caller decides whether a short result
/// is fatal (the compressed-block layer treats it as one).
pub fn decode(data: &[u8], declared_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(declared_len);
    let mut pos = 0;

    while pos < data.len() && out.len() < declared_len {
        let control = data[pos];
        pos += 1;
        let count = (control & !REPEAT_FLAG) as usize;

        if control & REPEAT_FLAG != 0 {
            if pos >= data.len() {
                warn!(declared_len, produced = out.len(), "RLE input ended before run value byte");
                break;
            }
            let value = data[pos];
            pos += 1;
            let emit = count.min(declared_len - out.len());
            if emit < count {
                warn!(count, emit, "RLE repeat run clipped at declared output length");
            }
            out.extend(std::iter::repeat(value).take(emit));
        } else {
            let available = data.len() - pos;
            let emit = count.min(available).min(declared_len - out.len());
            if emit < count {
                warn!(count, emit, "RLE literal run clipped");
            }
            out.extend_from_slice(&data[pos..pos + emit]);
            pos += count.min(available);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_fives_round_trip() {
        let data = [5u8; 8];
        let encoded = encode(&data);
        assert_eq!(encoded, vec![REPEAT_FLAG | 8, 5]);
        assert_eq!(decode(&encoded, data.len()), data);
    }

    #[test]
    fn short_runs_stay_literal() {
        // Runs below the threshold must never become repeat control bytes.
        let data = [1u8, 1, 2, 2, 3, 3];
        let encoded = encode(&data);
        assert_eq!(encoded, vec![6, 1, 1, 2, 2, 3, 3]);
        assert_eq!(decode(&encoded, data.len()), data);
    }

    #[test]
    fn threshold_two_compresses_pairs() {
        let data = [1u8, 1, 2, 2];
        let encoded = encode_with_threshold(&data, 2);
        assert_eq!(encoded, vec![REPEAT_FLAG | 2, 1, REPEAT_FLAG | 2, 2]);
        assert_eq!(decode(&encoded, data.len()), data);
    }

    #[test]
    fn long_runs_split_at_127() {
        let data = [9u8; 300];
        let encoded = encode(&data);
        assert_eq!(
            encoded,
            vec![
                REPEAT_FLAG | 127,
                9,
                REPEAT_FLAG | 127,
                9,
                REPEAT_FLAG | 46,
                9
            ]
        );
        assert_eq!(decode(&encoded, 300), data);
    }

    #[test]
    fn mixed_content_round_trip() {
        let data: Vec<u8> = (0..64u8)
            .flat_map(|v| std::iter::repeat(v).take((v as usize % 5) + 1))
            .collect();
        let encoded = encode(&data);
        assert_eq!(decode(&encoded, data.len()), data);
    }

    #[test]
    fn decode_clips_instead_of_overrunning() {
        let encoded = [REPEAT_FLAG | 10, 7];
        assert_eq!(decode(&encoded, 4), vec![7, 7, 7, 7]);
    }

    #[test]
    fn decode_stops_on_truncated_input() {
        // Literal control byte promises 5 bytes but only 2 follow.
        let encoded = [5u8, 1, 2];
        assert_eq!(decode(&encoded, 5), vec![1, 2]);
        // Repeat control byte with no value byte at all.
        assert_eq!(decode(&[REPEAT_FLAG | 3], 3), Vec::<u8>::new());
    }
}
