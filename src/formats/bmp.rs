//! Dynamix bitmap resources.
//!
//! A `BMP` chunk wraps the per-image tables:
//!
//! * `INF`: u16 frame count, then that many u16 widths and u16 heights
//! * `BIN`: compressed block holding the 4bpp frame data (the low-nibble
//!   plane when a `VGA` chunk is present, the whole image otherwise)
//! * `VGA`: optional compressed block, high-nibble plane of a split 8-bit
//!   image
//! * `MTX`: optional tile matrix: u16 width, u16 height, then `i16`
//!   frame indices in column-major order
//!
//! Frames are stored back to back as big-endian packed 4bpp rows, stride
//! `ceil(width / 2)`. With a matrix present every frame is a tile of one
//! shared size and decoding yields the composed sheet.

use std::io::Cursor;

use tracing::debug;

use crate::atlas::TileAtlas;
use crate::binary_utils::{push_i16_le, push_u16_le, read_i16_le, read_u16_le};
use crate::chunk::{find_chunk, ChunkBuilder};
use crate::compression::{compress_block, decompress_block};
use crate::error::{CodecError, CodecResult};
use crate::pixels::{bitpack, PixelBuffer};

use super::{CompressionChoice, DecodedImage, FormatKind, FrameInfo, SaveOptions};

pub const FORMAT_NAME: &str = "bitmap";

struct FrameTable {
    widths: Vec<usize>,
    heights: Vec<usize>,
}

fn read_frame_table(payload: &[u8]) -> CodecResult<FrameTable> {
    let mut cursor = Cursor::new(payload);
    let io = |e| CodecError::from_io(FORMAT_NAME, e);
    let count = read_u16_le(&mut cursor).map_err(io)? as usize;
    let mut widths = Vec::with_capacity(count);
    let mut heights = Vec::with_capacity(count);
    for _ in 0..count {
        widths.push(read_u16_le(&mut cursor).map_err(io)? as usize);
    }
    for _ in 0..count {
        heights.push(read_u16_le(&mut cursor).map_err(io)? as usize);
    }
    Ok(FrameTable { widths, heights })
}

fn write_frame_table(frames: &[PixelBuffer]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(2 + frames.len() * 4);
    push_u16_le(&mut payload, frames.len() as u16);
    for frame in frames {
        push_u16_le(&mut payload, frame.width() as u16);
    }
    for frame in frames {
        push_u16_le(&mut payload, frame.height() as u16);
    }
    payload
}

/// Split the decompressed plane bytes into per-frame packed slices and
/// unpack each to flat 8bpp.
fn unpack_frames(plane: &[u8], table: &FrameTable) -> CodecResult<Vec<Vec<u8>>> {
    let mut frames = Vec::with_capacity(table.widths.len());
    let mut offset = 0;
    for (index, (&width, &height)) in table.widths.iter().zip(&table.heights).enumerate() {
        let stride = bitpack::min_stride(width, 4);
        let size = stride * height;
        if offset + size > plane.len() {
            return Err(CodecError::structural(
                FORMAT_NAME,
                format!(
                    "frame {} needs {} plane bytes at offset {} but only {} exist",
                    index,
                    size,
                    offset,
                    plane.len()
                ),
            ));
        }
        frames.push(bitpack::unpack(
            &plane[offset..offset + size],
            width,
            height,
            4,
            stride,
            true,
        )?);
        offset += size;
    }
    Ok(frames)
}

fn pack_frames(frames: &[Vec<u8>], table: &FrameTable) -> CodecResult<Vec<u8>> {
    let mut plane = Vec::new();
    for (flat, (&width, &height)) in frames.iter().zip(table.widths.iter().zip(&table.heights)) {
        let (packed, _) = bitpack::pack(flat, width, height, 4, true)?;
        plane.extend_from_slice(&packed);
    }
    Ok(plane)
}

struct Matrix {
    width: usize,
    height: usize,
    indices: Vec<i16>,
}

fn read_matrix(payload: &[u8]) -> CodecResult<Matrix> {
    let mut cursor = Cursor::new(payload);
    let io = |e| CodecError::from_io(FORMAT_NAME, e);
    let width = read_u16_le(&mut cursor).map_err(io)? as usize;
    let height = read_u16_le(&mut cursor).map_err(io)? as usize;
    // The declared cell count is untrusted; prove the payload holds that
    // many i16 entries before reserving anything.
    if payload.len() < 4 + width * height * 2 {
        return Err(CodecError::structural(
            FORMAT_NAME,
            format!(
                "matrix declares {}x{} cells but the chunk holds {} bytes",
                width,
                height,
                payload.len()
            ),
        ));
    }
    let mut indices = Vec::with_capacity(width * height);
    for _ in 0..width * height {
        indices.push(read_i16_le(&mut cursor).map_err(io)?);
    }
    Ok(Matrix {
        width,
        height,
        indices,
    })
}

pub fn decode(bytes: &[u8]) -> CodecResult<DecodedImage> {
    let bmp = find_chunk(bytes, "BMP")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no BMP chunk".to_string()))?;

    let inf = find_chunk(bmp.payload, "INF")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no INF chunk".to_string()))?;
    let table = read_frame_table(inf.payload)?;
    if table.widths.is_empty() {
        return Err(CodecError::structural(
            FORMAT_NAME,
            "frame table is empty".to_string(),
        ));
    }

    let bin = find_chunk(bmp.payload, "BIN")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no BIN chunk".to_string()))?;
    let low_plane = decompress_block(bin.payload)?;
    let low_frames = unpack_frames(&low_plane, &table)?;

    let vga = find_chunk(bmp.payload, "VGA")?;
    let (mut flats, depth) = match vga {
        Some(vga) => {
            let high_plane = decompress_block(vga.payload)?;
            let high_frames = unpack_frames(&high_plane, &table)?;
            let merged = low_frames
                .iter()
                .zip(&high_frames)
                .map(|(low, high)| bitpack::merge_nibble_planes(low, high))
                .collect::<CodecResult<Vec<_>>>()?;
            (merged, 8)
        }
        None => (low_frames, 4),
    };
    debug!(frames = flats.len(), depth, "bitmap planes decoded");

    let frame_info: Vec<FrameInfo> = table
        .widths
        .iter()
        .zip(&table.heights)
        .map(|(&w, &h)| FrameInfo {
            width: w as u16,
            height: h as u16,
            source_bits_per_pixel: depth as u8,
        })
        .collect();

    if let Some(mtx) = find_chunk(bmp.payload, "MTX")? {
        let matrix = read_matrix(mtx.payload)?;
        if matrix.indices.len() < table.widths.len() {
            return Err(CodecError::structural(
                FORMAT_NAME,
                format!(
                    "matrix of {} cells cannot reference {} frames",
                    matrix.indices.len(),
                    table.widths.len()
                ),
            ));
        }
        let (tile_width, tile_height) = (table.widths[0], table.heights[0]);
        let tiles = flats
            .drain(..)
            .zip(table.widths.iter().zip(&table.heights))
            .enumerate()
            .map(|(index, (flat, (&w, &h)))| {
                if w != tile_width || h != tile_height {
                    return Err(CodecError::structural(
                        FORMAT_NAME,
                        format!(
                            "tile frame {} is {}x{}, expected {}x{}",
                            index, w, h, tile_width, tile_height
                        ),
                    ));
                }
                PixelBuffer::from_flat(w, h, flat, None)
            })
            .collect::<CodecResult<Vec<_>>>()?;
        let atlas = TileAtlas {
            matrix_width: matrix.width,
            matrix_height: matrix.height,
            indices: matrix.indices,
            tiles,
        };
        let sheet = atlas.compose(None)?;
        let info = FrameInfo {
            width: sheet.width() as u16,
            height: sheet.height() as u16,
            source_bits_per_pixel: depth as u8,
        };
        return Ok(DecodedImage {
            format: FormatKind::TiledBitmap,
            frames: vec![sheet],
            palette: None,
            frame_info: vec![info],
        });
    }

    let frames = flats
        .drain(..)
        .zip(table.widths.iter().zip(&table.heights))
        .map(|(flat, (&w, &h))| PixelBuffer::from_flat(w, h, flat, None))
        .collect::<CodecResult<Vec<_>>>()?;

    Ok(DecodedImage {
        format: FormatKind::Bitmap,
        frames,
        palette: None,
        frame_info,
    })
}

fn plane_chunks(
    flats: &[Vec<u8>],
    table: &FrameTable,
    split: bool,
    compression: CompressionChoice,
) -> CodecResult<Vec<ChunkBuilder>> {
    let mut chunks = Vec::new();
    if split {
        let mut lows = Vec::with_capacity(flats.len());
        let mut highs = Vec::with_capacity(flats.len());
        for flat in flats {
            let (low, high) = bitpack::split_nibble_planes(flat);
            lows.push(low);
            highs.push(high);
        }
        let low_plane = pack_frames(&lows, table)?;
        let high_plane = pack_frames(&highs, table)?;
        chunks.push(ChunkBuilder::new(
            "BIN",
            compress_plane(&low_plane, compression)?,
        ));
        chunks.push(ChunkBuilder::new(
            "VGA",
            compress_plane(&high_plane, compression)?,
        ));
    } else {
        let plane = pack_frames(flats, table)?;
        chunks.push(ChunkBuilder::new("BIN", compress_plane(&plane, compression)?));
    }
    Ok(chunks)
}

fn compress_plane(plane: &[u8], compression: CompressionChoice) -> CodecResult<Vec<u8>> {
    match compression {
        CompressionChoice::Auto => {
            let rle = compress_block(plane, crate::compression::CompressionType::RunLength)?;
            let lzw = compress_block(plane, crate::compression::CompressionType::Lzw)?;
            Ok(if lzw.len() < rle.len() { lzw } else { rle })
        }
        CompressionChoice::Store => {
            compress_block(plane, crate::compression::CompressionType::Store)
        }
        CompressionChoice::RunLength => {
            compress_block(plane, crate::compression::CompressionType::RunLength)
        }
        CompressionChoice::Lzw => compress_block(plane, crate::compression::CompressionType::Lzw),
    }
}

/// Encode a plain (non-tiled) multi-frame bitmap.
pub fn encode(frames: &[PixelBuffer], options: &SaveOptions) -> CodecResult<Vec<u8>> {
    if frames.is_empty() {
        return Err(CodecError::structural(
            FORMAT_NAME,
            "nothing to encode".to_string(),
        ));
    }

    let table = FrameTable {
        widths: frames.iter().map(|f| f.width()).collect(),
        heights: frames.iter().map(|f| f.height()).collect(),
    };
    let flats = frames
        .iter()
        .map(|f| f.to_flat(true))
        .collect::<CodecResult<Vec<_>>>()?;
    let split = flats.iter().any(|flat| flat.iter().any(|&p| p > 0x0F));

    let mut children = vec![ChunkBuilder::new("INF", write_frame_table(frames))];
    children.extend(plane_chunks(&flats, &table, split, options.compression)?);
    Ok(ChunkBuilder::container("BMP", children).write())
}

/// Encode a tiled sheet: partition into deduplicated tiles and write the
/// index matrix alongside the tile frames.
pub fn encode_tiled(sheet: &PixelBuffer, options: &SaveOptions) -> CodecResult<Vec<u8>> {
    let atlas = TileAtlas::build(
        sheet,
        options.tile_width as usize,
        options.tile_height as usize,
    )?;

    let table = FrameTable {
        widths: atlas.tiles.iter().map(|t| t.width()).collect(),
        heights: atlas.tiles.iter().map(|t| t.height()).collect(),
    };
    let flats = atlas
        .tiles
        .iter()
        .map(|t| t.to_flat(true))
        .collect::<CodecResult<Vec<_>>>()?;
    let split = flats.iter().any(|flat| flat.iter().any(|&p| p > 0x0F));

    let mut mtx = Vec::with_capacity(4 + atlas.indices.len() * 2);
    push_u16_le(&mut mtx, atlas.matrix_width as u16);
    push_u16_le(&mut mtx, atlas.matrix_height as u16);
    for &index in &atlas.indices {
        push_i16_le(&mut mtx, index);
    }

    let mut children = vec![ChunkBuilder::new("INF", write_frame_table(&atlas.tiles))];
    children.extend(plane_chunks(&flats, &table, split, options.compression)?);
    children.push(ChunkBuilder::new("MTX", mtx));
    Ok(ChunkBuilder::container("BMP", children).write())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::SaveVariant;

    fn options(compression: CompressionChoice) -> SaveOptions {
        SaveOptions {
            variant: SaveVariant::Bitmap,
            compression,
            tile_width: 2,
            tile_height: 2,
        }
    }

    #[test]
    fn plain_4bit_round_trip() {
        let frames = vec![
            PixelBuffer::from_flat(4, 2, vec![0, 1, 2, 3, 4, 5, 6, 7], None).unwrap(),
            PixelBuffer::from_flat(2, 2, vec![15, 0, 0, 15], None).unwrap(),
        ];
        let bytes = encode(&frames, &options(CompressionChoice::Store)).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.format, FormatKind::Bitmap);
        assert_eq!(decoded.frames.len(), 2);
        assert_eq!(decoded.frames[0].data(), frames[0].data());
        assert_eq!(decoded.frames[1].data(), frames[1].data());
        assert_eq!(decoded.frame_info[0].source_bits_per_pixel, 4);
    }

    #[test]
    fn split_plane_8bit_round_trip() {
        let pixels: Vec<u8> = (0..32u8).map(|v| v.wrapping_mul(37)).collect();
        let frames = vec![PixelBuffer::from_flat(8, 4, pixels.clone(), None).unwrap()];
        let bytes = encode(&frames, &options(CompressionChoice::RunLength)).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.frames[0].data(), pixels.as_slice());
        assert_eq!(decoded.frame_info[0].source_bits_per_pixel, 8);
    }

    #[test]
    fn tiled_sheet_round_trip_preserves_pixels() {
        // 4x4 sheet of 2x2 tiles with duplicates.
        let data = vec![
            1, 1, 2, 2, //
            1, 1, 2, 2, //
            2, 2, 1, 1, //
            2, 2, 1, 1, //
        ];
        let sheet = PixelBuffer::from_flat(4, 4, data.clone(), None).unwrap();
        let bytes = encode_tiled(&sheet, &options(CompressionChoice::Auto)).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.format, FormatKind::TiledBitmap);
        assert_eq!(decoded.frames.len(), 1);
        assert_eq!(decoded.frames[0].data(), data.as_slice());
    }

    #[test]
    fn huge_matrix_over_tiny_payload_is_structural() {
        // A 4-byte MTX declaring 0xFFFF x 0xFFFF cells must be rejected by
        // the payload bounds check, not read entry by entry.
        let mut inf = Vec::new();
        push_u16_le(&mut inf, 1);
        push_u16_le(&mut inf, 2);
        push_u16_le(&mut inf, 2);
        let plane = compress_block(
            &[0x11, 0x11],
            crate::compression::CompressionType::Store,
        )
        .unwrap();
        let mut mtx = Vec::new();
        push_u16_le(&mut mtx, 0xFFFF);
        push_u16_le(&mut mtx, 0xFFFF);
        let bytes = ChunkBuilder::container(
            "BMP",
            vec![
                ChunkBuilder::new("INF", inf),
                ChunkBuilder::new("BIN", plane),
                ChunkBuilder::new("MTX", mtx),
            ],
        )
        .write();
        assert!(decode(&bytes).unwrap_err().is_structural());
    }

    #[test]
    fn missing_inf_is_structural() {
        let bytes = ChunkBuilder::container("BMP", vec![ChunkBuilder::new("BIN", vec![])]).write();
        assert!(decode(&bytes).unwrap_err().is_structural());
    }

    #[test]
    fn truncated_plane_is_structural() {
        let frames = vec![PixelBuffer::from_flat(4, 4, vec![1; 16], None).unwrap()];
        let bytes = encode(&frames, &options(CompressionChoice::Store)).unwrap();
        // Shrink the declared BIN plane by corrupting INF's height.
        let mut corrupt = bytes.clone();
        let height_pos = {
            let bmp = find_chunk(&corrupt, "BMP").unwrap().unwrap();
            let inf = find_chunk(bmp.payload, "INF").unwrap().unwrap();
            // 8 (BMP header) + chunk offset + 8 (INF header) + 4 (count + width).
            8 + inf.offset + 8 + 4
        };
        corrupt[height_pos] = 9;
        assert!(decode(&corrupt).unwrap_err().is_structural());
    }
}
