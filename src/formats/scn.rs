//! SCN sprite sheets.
//!
//! Scene sprites store every frame run-delta encoded in one shared data
//! chunk, addressed through an offset table:
//!
//! * `INF`: u16 frame count, u16 widths, u16 heights
//! * `OFF`: one i32 little-endian byte offset per frame into the `BIN`
//!   payload, ascending
//! * `BIN`: raw concatenation of the per-frame run-delta streams
//!
//! Frame `N` spans `[off[N], off[N + 1])`; the last frame runs to the end
//! of the chunk. Bit depth is sniffed per frame from the encoded range.

use std::io::Cursor;

use tracing::debug;

use crate::binary_utils::{push_i32_le, push_u16_le, read_i32_le, read_u16_le};
use crate::chunk::{find_chunk, ChunkBuilder};
use crate::compression::scn;
use crate::error::{CodecError, CodecResult};
use crate::pixels::PixelBuffer;

use super::{DecodedImage, FormatKind, FrameInfo, SaveOptions};

pub const FORMAT_NAME: &str = "scene sprite";

pub fn decode(bytes: &[u8]) -> CodecResult<DecodedImage> {
    let scn_chunk = find_chunk(bytes, "SCN")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no SCN chunk".to_string()))?;
    let io = |e| CodecError::from_io(FORMAT_NAME, e);

    let inf = find_chunk(scn_chunk.payload, "INF")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no INF chunk".to_string()))?;
    let mut cursor = Cursor::new(inf.payload);
    let count = read_u16_le(&mut cursor).map_err(io)? as usize;
    let mut widths = Vec::with_capacity(count);
    let mut heights = Vec::with_capacity(count);
    for _ in 0..count {
        widths.push(read_u16_le(&mut cursor).map_err(io)? as usize);
    }
    for _ in 0..count {
        heights.push(read_u16_le(&mut cursor).map_err(io)? as usize);
    }

    let off = find_chunk(scn_chunk.payload, "OFF")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no OFF chunk".to_string()))?;
    let mut cursor = Cursor::new(off.payload);
    let mut offsets = Vec::with_capacity(count);
    for index in 0..count {
        let offset = read_i32_le(&mut cursor).map_err(io)?;
        if offset < 0 {
            return Err(CodecError::structural(
                FORMAT_NAME,
                format!("negative frame offset {} for frame {}", offset, index),
            ));
        }
        offsets.push(offset as usize);
    }

    let bin = find_chunk(scn_chunk.payload, "BIN")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no BIN chunk".to_string()))?;

    let mut frames = Vec::with_capacity(count);
    let mut frame_info = Vec::with_capacity(count);
    for index in 0..count {
        let start = offsets[index];
        let end = if index + 1 < count {
            offsets[index + 1]
        } else {
            bin.payload.len()
        };
        if start > end || end > bin.payload.len() {
            return Err(CodecError::structural(
                FORMAT_NAME,
                format!(
                    "frame {} spans [{}, {}) outside the {}-byte data chunk",
                    index,
                    start,
                    end,
                    bin.payload.len()
                ),
            ));
        }

        let encoded = &bin.payload[start..end];
        let depth = scn::detect_depth(encoded);
        let flat = scn::decode_frame(encoded, widths[index], heights[index])?;
        frames.push(PixelBuffer::from_flat(
            widths[index],
            heights[index],
            flat,
            None,
        )?);
        frame_info.push(FrameInfo {
            width: widths[index] as u16,
            height: heights[index] as u16,
            source_bits_per_pixel: depth as u8,
        });
    }
    debug!(frames = frames.len(), "scene sprite decoded");

    Ok(DecodedImage {
        format: FormatKind::Scene,
        frames,
        palette: None,
        frame_info,
    })
}

pub fn encode(frames: &[PixelBuffer], _options: &SaveOptions) -> CodecResult<Vec<u8>> {
    if frames.is_empty() {
        return Err(CodecError::structural(
            FORMAT_NAME,
            "nothing to encode".to_string(),
        ));
    }

    let mut inf = Vec::with_capacity(2 + frames.len() * 4);
    push_u16_le(&mut inf, frames.len() as u16);
    for frame in frames {
        push_u16_le(&mut inf, frame.width() as u16);
    }
    for frame in frames {
        push_u16_le(&mut inf, frame.height() as u16);
    }

    let mut off = Vec::with_capacity(frames.len() * 4);
    let mut bin = Vec::new();
    for frame in frames {
        push_i32_le(&mut off, bin.len() as i32);
        let flat = frame.to_flat(true)?;
        let (encoded, _) = scn::encode_frame(&flat, frame.width(), frame.height())?;
        bin.extend_from_slice(&encoded);
    }

    Ok(ChunkBuilder::container(
        "SCN",
        vec![
            ChunkBuilder::new("INF", inf),
            ChunkBuilder::new("OFF", off),
            ChunkBuilder::new("BIN", bin),
        ],
    )
    .write())
}
