//! Packed-pixel row conversion.
//!
//! The Dynamix formats store image rows at 1, 2, 4 or 8 bits per pixel;
//! decoding works on a flat one-byte-per-pixel buffer instead. `big_endian`
//! places the first pixel of a byte in its most significant bits, the
//! DOS-era convention used by most of these formats. Several formats also
//! store an 8-bit image as two separately compressed 4-bit planes (`BIN` =
//! low nibbles, `VGA` = high nibbles); the plane split/merge lives here too.

use crate::error::{CodecError, CodecResult};

/// Minimum bytes per row for a given width and depth.
pub fn min_stride(width: usize, bits_per_pixel: usize) -> usize {
    (width * bits_per_pixel + 7) / 8
}

fn check_depth(bits_per_pixel: usize) -> CodecResult<()> {
    match bits_per_pixel {
        1 | 2 | 4 | 8 => Ok(()),
        other => Err(CodecError::unsupported(
            "bitpack",
            format!("{} bits per pixel", other),
        )),
    }
}

/// Pack a flat 8bpp buffer into `target_bpp`-bit rows.
///
/// Returns the packed bytes and the stride used (the minimum for the given
/// width and depth). Padding bits past the image width are left zero.
pub fn pack(
    flat: &[u8],
    width: usize,
    height: usize,
    target_bpp: usize,
    big_endian: bool,
) -> CodecResult<(Vec<u8>, usize)> {
    check_depth(target_bpp)?;
    if flat.len() != width * height {
        return Err(CodecError::integrity(format!(
            "pack expected {} pixels, got {}",
            width * height,
            flat.len()
        )));
    }

    let stride = min_stride(width, target_bpp);
    let max_value = if target_bpp == 8 { 0xFF } else { (1u16 << target_bpp) as usize - 1 };
    let pixels_per_byte = 8 / target_bpp;
    let mut packed = vec![0u8; stride * height];

    for y in 0..height {
        for x in 0..width {
            let value = flat[y * width + x] as usize;
            if value > max_value {
                return Err(CodecError::integrity(format!(
                    "pixel value {} at ({}, {}) does not fit in {} bits",
                    value, x, y, target_bpp
                )));
            }
            let shift = if big_endian {
                8 - target_bpp - (x % pixels_per_byte) * target_bpp
            } else {
                (x % pixels_per_byte) * target_bpp
            };
            packed[y * stride + x / pixels_per_byte] |= (value as u8) << shift;
        }
    }

    Ok((packed, stride))
}

/// Unpack `source_bpp`-bit rows into a flat 8bpp buffer.
///
/// `stride` may exceed the theoretical minimum (row padding) but the packed
/// buffer must cover `stride * height` bytes.
pub fn unpack(
    packed: &[u8],
    width: usize,
    height: usize,
    source_bpp: usize,
    stride: usize,
    big_endian: bool,
) -> CodecResult<Vec<u8>> {
    check_depth(source_bpp)?;
    if stride < min_stride(width, source_bpp) {
        return Err(CodecError::structural(
            "bitpack",
            format!(
                "stride {} is below the minimum {} for width {} at {}bpp",
                stride,
                min_stride(width, source_bpp),
                width,
                source_bpp
            ),
        ));
    }
    if packed.len() < stride * height {
        return Err(CodecError::structural(
            "bitpack",
            format!(
                "packed buffer holds {} bytes, {} rows of stride {} need {}",
                packed.len(),
                height,
                stride,
                stride * height
            ),
        ));
    }

    let pixels_per_byte = 8 / source_bpp;
    let mask = if source_bpp == 8 { 0xFF } else { (1u8 << source_bpp) - 1 };
    let mut flat = Vec::with_capacity(width * height);

    for y in 0..height {
        for x in 0..width {
            let byte = packed[y * stride + x / pixels_per_byte];
            let shift = if big_endian {
                8 - source_bpp - (x % pixels_per_byte) * source_bpp
            } else {
                (x % pixels_per_byte) * source_bpp
            };
            flat.push((byte >> shift) & mask);
        }
    }

    Ok(flat)
}

/// Split a flat 8bpp buffer into its low- and high-nibble planes.
pub fn split_nibble_planes(flat: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut low = Vec::with_capacity(flat.len());
    let mut high = Vec::with_capacity(flat.len());
    for &pixel in flat {
        low.push(pixel & 0x0F);
        high.push((pixel >> 4) & 0x0F);
    }
    (low, high)
}

/// Recombine nibble planes: `high << 4 | low` per pixel. Exact inverse of
/// [`split_nibble_planes`].
pub fn merge_nibble_planes(low: &[u8], high: &[u8]) -> CodecResult<Vec<u8>> {
    if low.len() != high.len() {
        return Err(CodecError::integrity(format!(
            "nibble planes differ in length: low {} vs high {}",
            low.len(),
            high.len()
        )));
    }
    Ok(low
        .iter()
        .zip(high.iter())
        .map(|(&l, &h)| (h << 4) | (l & 0x0F))
        .collect())
}
