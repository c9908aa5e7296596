//! Codecs for the chunked sprite and image containers used by a family of
//! early-90s DOS adventure games.
//!
//! The crate is layered bottom-up:
//!
//! * [`chunk`]: the recursive three-letter-tag container every file
//!   format is built from
//! * [`compression`]: the block codecs (store, run-length, LZW) plus the
//!   run-delta and bitmask pixel schemes
//! * [`pixels`]: depth repacking between packed 1/2/4/8bpp rows and flat
//!   8bpp working buffers
//! * [`atlas`]: tile deduplication and the column-major index matrix
//! * [`formats`]: the concrete file formats and the [`decode_file`] /
//!   [`encode_file`] entry points
//!
//! Everything decodes into flat 8bpp [`pixels::PixelBuffer`]s with an
//! optional palette; encoders take the same representation back.

pub mod atlas;
pub mod binary_utils;
pub mod chunk;
pub mod compression;
pub mod error;
pub mod formats;
pub mod pixels;

pub use atlas::TileAtlas;
pub use error::{CodecError, CodecResult};
pub use formats::{
    decode_file, decode_palette, encode_file, encode_palette, CompressionChoice, DecodedImage,
    FormatKind, FrameInfo, SaveOptions, SaveVariant,
};
pub use pixels::{PixelBuffer, Rgb};
