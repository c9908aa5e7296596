//! Indexed pixel buffers and palettes.
//!
//! A [`PixelBuffer`] describes one image plane: dimensions, bit depth,
//! stride and the backing bytes, plus an optional palette of RGB triples
//! (index = pixel value). Decoded working buffers are flat 8bpp with
//! `stride == width`; packed source planes can be represented too, which is
//! what the stride/depth invariants are for.

pub mod bitpack;

use crate::error::{CodecError, CodecResult};

/// One palette entry, 8-bit RGB.
pub type Rgb = [u8; 3];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    bits_per_pixel: usize,
    stride: usize,
    data: Vec<u8>,
    palette: Option<Vec<Rgb>>,
}

impl PixelBuffer {
    /// Construct a buffer, enforcing the layout invariants: a supported
    /// depth, `stride >= ceil(width * bpp / 8)`, `data.len() == stride *
    /// height`, and a palette no larger than the depth can index.
    pub fn new(
        width: usize,
        height: usize,
        bits_per_pixel: usize,
        stride: usize,
        data: Vec<u8>,
        palette: Option<Vec<Rgb>>,
    ) -> CodecResult<Self> {
        if !matches!(bits_per_pixel, 1 | 2 | 4 | 8) {
            return Err(CodecError::unsupported(
                "pixel buffer",
                format!("{} bits per pixel", bits_per_pixel),
            ));
        }
        if stride < bitpack::min_stride(width, bits_per_pixel) {
            return Err(CodecError::structural(
                "pixel buffer",
                format!(
                    "stride {} below minimum {} for width {} at {}bpp",
                    stride,
                    bitpack::min_stride(width, bits_per_pixel),
                    width,
                    bits_per_pixel
                ),
            ));
        }
        if data.len() != stride * height {
            return Err(CodecError::integrity(format!(
                "pixel data holds {} bytes, expected stride {} * height {} = {}",
                data.len(),
                stride,
                height,
                stride * height
            )));
        }
        if let Some(palette) = &palette {
            let max_entries = 1usize << bits_per_pixel;
            if palette.len() > max_entries {
                return Err(CodecError::resource_limit(format!(
                    "palette of {} entries exceeds {} for {}bpp",
                    palette.len(),
                    max_entries,
                    bits_per_pixel
                )));
            }
        }
        Ok(PixelBuffer {
            width,
            height,
            bits_per_pixel,
            stride,
            data,
            palette,
        })
    }

    /// A flat 8bpp buffer, one byte per pixel, `stride == width`.
    pub fn from_flat(
        width: usize,
        height: usize,
        data: Vec<u8>,
        palette: Option<Vec<Rgb>>,
    ) -> CodecResult<Self> {
        Self::new(width, height, 8, width, data, palette)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bits_per_pixel(&self) -> usize {
        self.bits_per_pixel
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn palette(&self) -> Option<&[Rgb]> {
        self.palette.as_deref()
    }

    pub fn set_palette(&mut self, palette: Option<Vec<Rgb>>) {
        self.palette = palette;
    }

    /// Unpack to one byte per pixel regardless of the stored depth.
    pub fn to_flat(&self, big_endian: bool) -> CodecResult<Vec<u8>> {
        if self.bits_per_pixel == 8 && self.stride == self.width {
            return Ok(self.data.clone());
        }
        bitpack::unpack(
            &self.data,
            self.width,
            self.height,
            self.bits_per_pixel,
            self.stride,
            big_endian,
        )
    }

    /// Repack into a new buffer at `target_bpp`. The palette carries over
    /// when it still fits the target depth.
    pub fn repack(&self, target_bpp: usize, big_endian: bool) -> CodecResult<PixelBuffer> {
        let flat = self.to_flat(big_endian)?;
        let (packed, stride) = bitpack::pack(&flat, self.width, self.height, target_bpp, big_endian)?;
        let palette = self
            .palette
            .clone()
            .filter(|p| p.len() <= 1usize << target_bpp);
        PixelBuffer::new(self.width, self.height, target_bpp, stride, packed, palette)
    }
}

/// Replace the palette on every buffer in `frames`.
///
/// This is the single explicit propagation operation: buffers never hold a
/// back-reference to a container, so "share this palette with all frames"
/// is one call made by the orchestrating layer.
pub fn apply_palette(frames: &mut [PixelBuffer], palette: &[Rgb]) -> CodecResult<()> {
    for (index, frame) in frames.iter_mut().enumerate() {
        let max_entries = 1usize << frame.bits_per_pixel;
        if palette.len() > max_entries {
            return Err(CodecError::resource_limit(format!(
                "palette of {} entries exceeds {} for frame {} at {}bpp",
                palette.len(),
                max_entries,
                index,
                frame.bits_per_pixel
            )));
        }
        frame.palette = Some(palette.to_vec());
    }
    Ok(())
}
