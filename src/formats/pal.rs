//! VGA palette resources.
//!
//! A `PAL` chunk wraps a `VGA` chunk of exactly 768 bytes: 256 RGB triples
//! with 6-bit DAC components. Loading widens each component to 8 bits
//! (`c << 2 | c >> 4`, the usual DAC expansion); saving narrows back with a
//! plain `>> 2`. Palette files carry no pixels, so they live outside the
//! frame-oriented `decode_file` pipeline.

use crate::chunk::{find_chunk, ChunkBuilder};
use crate::error::{CodecError, CodecResult};
use crate::pixels::Rgb;

pub const FORMAT_NAME: &str = "palette";

const PALETTE_BYTES: usize = 768;
const DAC_MAX: u8 = 0x3F;

pub fn decode_palette(bytes: &[u8]) -> CodecResult<Vec<Rgb>> {
    let pal = find_chunk(bytes, "PAL")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no PAL chunk".to_string()))?;
    let vga = find_chunk(pal.payload, "VGA")?
        .ok_or_else(|| CodecError::structural(FORMAT_NAME, "no VGA chunk".to_string()))?;
    if vga.payload.len() != PALETTE_BYTES {
        return Err(CodecError::structural(
            FORMAT_NAME,
            format!(
                "VGA palette holds {} bytes, expected {}",
                vga.payload.len(),
                PALETTE_BYTES
            ),
        ));
    }

    let palette = vga
        .payload
        .chunks_exact(3)
        .map(|rgb| [widen(rgb[0]), widen(rgb[1]), widen(rgb[2])])
        .collect();
    Ok(palette)
}

pub fn encode_palette(palette: &[Rgb]) -> CodecResult<Vec<u8>> {
    if palette.len() > 256 {
        return Err(CodecError::resource_limit(format!(
            "palette of {} entries exceeds 256",
            palette.len()
        )));
    }

    let mut payload = Vec::with_capacity(PALETTE_BYTES);
    for rgb in palette {
        payload.extend(rgb.iter().map(|&c| c >> 2));
    }
    // Files always carry the full 256-entry table.
    payload.resize(PALETTE_BYTES, 0);

    Ok(ChunkBuilder::container("PAL", vec![ChunkBuilder::new("VGA", payload)]).write())
}

fn widen(component: u8) -> u8 {
    let c = component.min(DAC_MAX);
    (c << 2) | (c >> 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_palette_round_trip() {
        // DAC-exact components, so narrowing and widening are lossless.
        let palette: Vec<Rgb> = (0..256usize)
            .map(|i| {
                let c = (i % 64) as u8;
                [widen(c), widen(63 - c), widen(c / 2)]
            })
            .collect();
        let bytes = encode_palette(&palette).unwrap();
        assert_eq!(decode_palette(&bytes).unwrap(), palette);
    }

    #[test]
    fn black_and_white_extremes() {
        let palette = vec![[0u8, 0, 0], [0xFF, 0xFF, 0xFF]];
        let bytes = encode_palette(&palette).unwrap();
        let decoded = decode_palette(&bytes).unwrap();
        assert_eq!(decoded[0], [0, 0, 0]);
        assert_eq!(decoded[1], [0xFF, 0xFF, 0xFF]);
        // Unset entries are black.
        assert_eq!(decoded[255], [0, 0, 0]);
    }

    #[test]
    fn wrong_payload_size_is_structural() {
        let bytes =
            ChunkBuilder::container("PAL", vec![ChunkBuilder::new("VGA", vec![0; 100])]).write();
        assert!(decode_palette(&bytes).unwrap_err().is_structural());
    }

    #[test]
    fn oversized_palette_is_rejected() {
        let palette = vec![[0u8, 0, 0]; 300];
        assert!(matches!(
            encode_palette(&palette).unwrap_err(),
            CodecError::ResourceLimit { .. }
        ));
    }
}
