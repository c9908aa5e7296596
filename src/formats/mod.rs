//! Concrete file formats and the two entry points the outer layers use:
//! [`decode_file`] and [`encode_file`].
//!
//! Formats are a closed set of tagged variants registered in the ordered
//! [`FORMATS`] table (id, name, extension hints, decode fn). A probe loop
//! walks the table, treating structural errors as "not this format" and
//! anything else as a definitive failure: a recognised format with an
//! unsupported feature must not be retried as the next candidate.

pub mod bmp;
pub mod pal;
pub mod scn;

use serde::Serialize;
use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::pixels::{PixelBuffer, Rgb};

pub use pal::{decode_palette, encode_palette};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormatKind {
    /// `BMP` container with a tile matrix; decodes to the composed sheet.
    TiledBitmap,
    /// Plain multi-frame `BMP` container.
    Bitmap,
    /// `SCN` run-delta sprite sheet.
    Scene,
}

/// Per-frame metadata handed to the excluded UI/interop layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    pub width: u16,
    pub height: u16,
    /// Depth the frame was stored at (4 or 8), before flattening.
    pub source_bits_per_pixel: u8,
}

/// The result of a successful load: flat 8bpp frames, an optional palette,
/// and one metadata record per frame.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub format: FormatKind,
    pub frames: Vec<PixelBuffer>,
    pub palette: Option<Vec<Rgb>>,
    pub frame_info: Vec<FrameInfo>,
}

impl DecodedImage {
    /// Render the frame table as JSON for metadata sidecar files.
    pub fn metadata_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Metadata<'a> {
            format: FormatKind,
            frames: &'a [FrameInfo],
        }
        serde_json::to_string_pretty(&Metadata {
            format: self.format,
            frames: &self.frame_info,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionChoice {
    /// Try RLE and LZW, keep the smaller (the store guard still applies).
    Auto,
    Store,
    RunLength,
    Lzw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveVariant {
    TiledBitmap,
    Bitmap,
    Scene,
}

/// Save-side option bag. Defined here but populated by the excluded
/// configuration layer.
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    pub variant: SaveVariant,
    pub compression: CompressionChoice,
    /// Tile size used when saving a tiled sheet.
    pub tile_width: u16,
    pub tile_height: u16,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            variant: SaveVariant::Bitmap,
            compression: CompressionChoice::Auto,
            tile_width: 8,
            tile_height: 8,
        }
    }
}

/// One entry in the probe table.
pub struct FormatDescriptor {
    pub id: FormatKind,
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub decode: fn(&[u8]) -> CodecResult<DecodedImage>,
}

/// Probe order: tiled bitmaps first (their container is a superset of the
/// plain one), then plain bitmaps, then scene sprites.
pub static FORMATS: &[FormatDescriptor] = &[
    FormatDescriptor {
        id: FormatKind::TiledBitmap,
        name: "tiled bitmap",
        extensions: &["bmp", "tbm"],
        decode: bmp::decode,
    },
    FormatDescriptor {
        id: FormatKind::Bitmap,
        name: "bitmap",
        extensions: &["bmp"],
        decode: bmp::decode,
    },
    FormatDescriptor {
        id: FormatKind::Scene,
        name: "scene sprite",
        extensions: &["scn"],
        decode: scn::decode,
    },
];

/// Decode a raw file by probing the format table in priority order.
///
/// Structural errors move on to the next candidate and are aggregated into
/// the final error when every candidate fails; unsupported-feature and
/// integrity errors are definitive and surface immediately.
pub fn decode_file(bytes: &[u8]) -> CodecResult<DecodedImage> {
    let mut attempts: Vec<String> = Vec::new();
    let mut tried_bitmap = false;

    for descriptor in FORMATS {
        // The two bitmap table entries share a decoder that reports tiled
        // or plain on its own; probe the container once.
        let is_bitmap = matches!(descriptor.id, FormatKind::Bitmap | FormatKind::TiledBitmap);
        if is_bitmap && tried_bitmap {
            continue;
        }
        tried_bitmap |= is_bitmap;

        match (descriptor.decode)(bytes) {
            Ok(image) => {
                debug!(format = descriptor.name, frames = image.frames.len(), "decoded");
                return Ok(image);
            }
            Err(err) if err.is_structural() => {
                attempts.push(format!("{}: {}", descriptor.name, err));
            }
            Err(err) => return Err(err),
        }
    }

    Err(CodecError::structural(
        "autodetect",
        format!(
            "tried {} formats, all failed: {}",
            attempts.len(),
            attempts.join("; ")
        ),
    ))
}

/// Encode frames into the variant selected by `options`.
pub fn encode_file(
    frames: &[PixelBuffer],
    palette: Option<&[Rgb]>,
    options: &SaveOptions,
) -> CodecResult<Vec<u8>> {
    // Palettes travel in separate PAL resources; encoding only checks that
    // the pixel data actually fits the palette it claims to use.
    if let Some(palette) = palette {
        for (index, frame) in frames.iter().enumerate() {
            let flat = frame.to_flat(true)?;
            if let Some(&pixel) = flat.iter().find(|&&p| p as usize >= palette.len()) {
                return Err(CodecError::integrity(format!(
                    "frame {} uses index {} outside the {}-entry palette",
                    index,
                    pixel,
                    palette.len()
                )));
            }
        }
    }

    match options.variant {
        SaveVariant::Bitmap => bmp::encode(frames, options),
        SaveVariant::TiledBitmap => {
            let sheet = frames.first().ok_or_else(|| {
                CodecError::structural("tiled bitmap", "nothing to encode".to_string())
            })?;
            if frames.len() != 1 {
                return Err(CodecError::structural(
                    "tiled bitmap",
                    format!("tiled sheets encode one composite frame, got {}", frames.len()),
                ));
            }
            bmp::encode_tiled(sheet, options)
        }
        SaveVariant::Scene => scn::encode(frames, options),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> PixelBuffer {
        PixelBuffer::from_flat(4, 2, vec![0, 1, 2, 3, 3, 2, 1, 0], None).unwrap()
    }

    #[test]
    fn autodetect_finds_each_variant() {
        let bitmap = encode_file(&[frame()], None, &SaveOptions::default()).unwrap();
        assert_eq!(decode_file(&bitmap).unwrap().format, FormatKind::Bitmap);

        let scene_options = SaveOptions {
            variant: SaveVariant::Scene,
            ..SaveOptions::default()
        };
        let scene = encode_file(&[frame()], None, &scene_options).unwrap();
        assert_eq!(decode_file(&scene).unwrap().format, FormatKind::Scene);

        let tiled_options = SaveOptions {
            variant: SaveVariant::TiledBitmap,
            tile_width: 2,
            tile_height: 2,
            ..SaveOptions::default()
        };
        let sheet = PixelBuffer::from_flat(4, 4, vec![1; 16], None).unwrap();
        let tiled = encode_file(&[sheet], None, &tiled_options).unwrap();
        assert_eq!(decode_file(&tiled).unwrap().format, FormatKind::TiledBitmap);
    }

    #[test]
    fn garbage_reports_every_attempt() {
        let err = decode_file(b"not a chunk file at all").unwrap_err();
        match err {
            CodecError::Structural { format, detail } => {
                assert_eq!(format, "autodetect");
                assert!(detail.contains("all failed"));
            }
            other => panic!("expected structural aggregate, got {}", other),
        }
    }

    #[test]
    fn unsupported_compression_stops_the_probe_loop() {
        // A valid BMP shell whose BIN block declares LZSS.
        let mut block = vec![3u8];
        block.extend_from_slice(&4u32.to_le_bytes());
        block.extend_from_slice(&[0; 4]);
        let mut inf = Vec::new();
        crate::binary_utils::push_u16_le(&mut inf, 1);
        crate::binary_utils::push_u16_le(&mut inf, 2);
        crate::binary_utils::push_u16_le(&mut inf, 2);
        let bytes = crate::chunk::ChunkBuilder::container(
            "BMP",
            vec![
                crate::chunk::ChunkBuilder::new("INF", inf),
                crate::chunk::ChunkBuilder::new("BIN", block),
            ],
        )
        .write();
        let err = decode_file(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Unsupported { .. }));
    }

    #[test]
    fn palette_bounds_are_checked_on_save() {
        let palette = vec![[0u8, 0, 0]; 2];
        let err = encode_file(&[frame()], Some(&palette), &SaveOptions::default()).unwrap_err();
        assert!(matches!(err, CodecError::Integrity { .. }));
    }

    #[test]
    fn metadata_json_lists_frames() {
        let bitmap = encode_file(&[frame()], None, &SaveOptions::default()).unwrap();
        let decoded = decode_file(&bitmap).unwrap();
        let json = decoded.metadata_json().unwrap();
        assert!(json.contains("\"width\": 4"));
        assert!(json.contains("Bitmap"));
    }
}
