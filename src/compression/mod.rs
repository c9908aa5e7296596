//! Compression codecs and the compressed-block envelope.
//!
//! A `BIN`/`VGA`-type chunk payload starts with one compression-type byte
//! (0 = raw, 1 = RLE, 2 = LZW; 3 is the reserved LZSS variant this crate
//! refuses), then a little-endian u32 uncompressed length, then the encoded
//! bytes. Decoding must produce exactly the declared length; anything else
//! is a hard error.

pub mod bitmask;
pub mod lzw;
pub mod rle;
pub mod scn;

use std::io::Cursor;

use tracing::debug;

use crate::binary_utils::{read_u32_le, read_u8};
use crate::error::{CodecError, CodecResult};

pub const BLOCK_HEADER_SIZE: usize = 5;

/// Declared lengths past this are rejected before allocation; the formats
/// in this family never reach a fraction of it.
pub const MAX_DECLARED_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    Store = 0,
    RunLength = 1,
    Lzw = 2,
    /// Recognised in the wild but intentionally unimplemented.
    Lzss = 3,
}

impl CompressionType {
    pub fn from_byte(byte: u8) -> CodecResult<Self> {
        match byte {
            0 => Ok(CompressionType::Store),
            1 => Ok(CompressionType::RunLength),
            2 => Ok(CompressionType::Lzw),
            3 => Ok(CompressionType::Lzss),
            other => Err(CodecError::unsupported(
                "compressed block",
                format!("unsupported compression type {}", other),
            )),
        }
    }
}

/// Decode a compressed block: type byte, declared length, payload.
pub fn decompress_block(payload: &[u8]) -> CodecResult<Vec<u8>> {
    let mut cursor = Cursor::new(payload);
    let kind_byte = read_u8(&mut cursor).map_err(|e| CodecError::from_io("compressed block", e))?;
    let kind = CompressionType::from_byte(kind_byte)?;
    let declared = read_u32_le(&mut cursor)
        .map_err(|e| CodecError::from_io("compressed block", e))? as usize;

    if declared > MAX_DECLARED_LENGTH {
        return Err(CodecError::resource_limit(format!(
            "block declares {} uncompressed bytes (limit {})",
            declared, MAX_DECLARED_LENGTH
        )));
    }

    let encoded = &payload[BLOCK_HEADER_SIZE..];
    let decoded = match kind {
        CompressionType::Store => {
            if encoded.len() != declared {
                return Err(CodecError::integrity(format!(
                    "stored block holds {} bytes but declares {}",
                    encoded.len(),
                    declared
                )));
            }
            encoded.to_vec()
        }
        CompressionType::RunLength => rle::decode(encoded, declared),
        CompressionType::Lzw => lzw::decode(encoded, declared)?,
        CompressionType::Lzss => {
            return Err(CodecError::unsupported(
                "compressed block",
                "LZSS (compression type 3) is recognised but not implemented",
            ));
        }
    };

    if decoded.len() != declared {
        return Err(CodecError::integrity(format!(
            "block decoded to {} bytes but declares {}",
            decoded.len(),
            declared
        )));
    }
    Ok(decoded)
}

/// Encode a compressed block with the original size-guard heuristic: the
/// compressed body is kept only when strictly smaller than the raw bytes,
/// otherwise the block stores raw with compression type 0.
pub fn compress_block(data: &[u8], preferred: CompressionType) -> CodecResult<Vec<u8>> {
    let encoded = match preferred {
        CompressionType::Store => None,
        CompressionType::RunLength => Some((CompressionType::RunLength, rle::encode(data))),
        CompressionType::Lzw => Some((CompressionType::Lzw, lzw::encode(data))),
        CompressionType::Lzss => {
            return Err(CodecError::unsupported(
                "compressed block",
                "LZSS (compression type 3) is recognised but not implemented",
            ));
        }
    };

    let (kind, body) = match encoded {
        Some((kind, body)) if body.len() < data.len() => (kind, body),
        _ => (CompressionType::Store, data.to_vec()),
    };
    debug!(kind = ?kind, raw = data.len(), stored = body.len(), "compressed block written");

    let mut out = Vec::with_capacity(BLOCK_HEADER_SIZE + body.len());
    out.push(kind as u8);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_block_round_trip() {
        let data = b"four score".to_vec();
        let block = compress_block(&data, CompressionType::Store).unwrap();
        assert_eq!(block[0], 0);
        assert_eq!(decompress_block(&block).unwrap(), data);
    }

    #[test]
    fn rle_block_round_trip() {
        let data = vec![3u8; 200];
        let block = compress_block(&data, CompressionType::RunLength).unwrap();
        assert_eq!(block[0], 1);
        assert!(block.len() < data.len());
        assert_eq!(decompress_block(&block).unwrap(), data);
    }

    #[test]
    fn incompressible_data_falls_back_to_store() {
        let data: Vec<u8> = (0..100u8).collect();
        let block = compress_block(&data, CompressionType::RunLength).unwrap();
        assert_eq!(block[0], 0);
        assert_eq!(decompress_block(&block).unwrap(), data);
    }

    #[test]
    fn lzss_is_rejected_without_decoding() {
        // Type 3 must raise unsupported before any decoding happens.
        let mut block = vec![3u8];
        block.extend_from_slice(&8u32.to_le_bytes());
        block.extend_from_slice(&[0xAA; 8]);
        let err = decompress_block(&block).unwrap_err();
        assert!(matches!(err, CodecError::Unsupported { .. }));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let block = [9u8, 0, 0, 0, 0];
        let err = decompress_block(&block).unwrap_err();
        assert!(matches!(err, CodecError::Unsupported { .. }));
    }

    #[test]
    fn short_rle_output_is_a_length_mismatch() {
        let mut block = vec![1u8];
        block.extend_from_slice(&10u32.to_le_bytes());
        block.extend_from_slice(&[0x85, 7]); // run of 5, declares 10
        let err = decompress_block(&block).unwrap_err();
        assert!(matches!(err, CodecError::Integrity { .. }));
    }

    #[test]
    fn bogus_declared_length_is_capped_before_allocation() {
        let mut block = vec![1u8];
        block.extend_from_slice(&u32::MAX.to_le_bytes());
        block.push(0);
        let err = decompress_block(&block).unwrap_err();
        assert!(matches!(err, CodecError::ResourceLimit { .. }));
    }
}
