//! Tile atlases: deduplicated fixed-size tiles plus an index matrix.
//!
//! The tiled sheet formats store a `matrixWidth x matrixHeight` grid of
//! `i16` frame indices in column-major order: flat entry `i` addresses row
//! `i % matrixHeight`, column `i / matrixHeight`, while the composed image
//! is raster row-major. That transpose is a quirk of the file format and is
//! reproduced here exactly.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hasher;

use tracing::debug;
use twox_hash::XxHash64;

use crate::error::{CodecError, CodecResult};
use crate::pixels::{PixelBuffer, Rgb};

/// Indices are stored as i16; anything past this cannot be represented.
pub const MAX_TILE_COUNT: usize = i16::MAX as usize;

#[derive(Debug, Clone)]
pub struct TileAtlas {
    pub matrix_width: usize,
    pub matrix_height: usize,
    /// Flat tile indices in file (column-major) order.
    pub indices: Vec<i16>,
    /// Unique tiles, all the same size, flat 8bpp.
    pub tiles: Vec<PixelBuffer>,
}

impl TileAtlas {
    /// Compose the full sheet from the index matrix (the load direction).
    pub fn compose(&self, palette: Option<Vec<Rgb>>) -> CodecResult<PixelBuffer> {
        if self.indices.len() != self.matrix_width * self.matrix_height {
            return Err(CodecError::structural(
                "tile atlas",
                format!(
                    "matrix {}x{} needs {} indices, got {}",
                    self.matrix_width,
                    self.matrix_height,
                    self.matrix_width * self.matrix_height,
                    self.indices.len()
                ),
            ));
        }
        let first = self.tiles.first().ok_or_else(|| {
            CodecError::structural("tile atlas", "atlas holds no tiles".to_string())
        })?;
        let (block_width, block_height) = (first.width(), first.height());
        for (index, tile) in self.tiles.iter().enumerate() {
            if tile.width() != block_width || tile.height() != block_height {
                return Err(CodecError::structural(
                    "tile atlas",
                    format!(
                        "tile {} is {}x{}, expected {}x{}",
                        index,
                        tile.width(),
                        tile.height(),
                        block_width,
                        block_height
                    ),
                ));
            }
        }

        let sheet_width = self.matrix_width * block_width;
        let sheet_height = self.matrix_height * block_height;
        let mut sheet = vec![0u8; sheet_width * sheet_height];

        for (i, &frame_index) in self.indices.iter().enumerate() {
            let row = i % self.matrix_height;
            let col = i / self.matrix_height;
            let tile = self
                .tiles
                .get(frame_index as usize)
                .filter(|_| frame_index >= 0)
                .ok_or_else(|| {
                    CodecError::structural(
                        "tile atlas",
                        format!(
                            "matrix cell ({}, {}) references tile {} of {}",
                            col,
                            row,
                            frame_index,
                            self.tiles.len()
                        ),
                    )
                })?;
            let data = tile.data();
            for y in 0..block_height {
                let dst = (row * block_height + y) * sheet_width + col * block_width;
                sheet[dst..dst + block_width]
                    .copy_from_slice(&data[y * tile.stride()..y * tile.stride() + block_width]);
            }
        }

        PixelBuffer::from_flat(sheet_width, sheet_height, sheet, palette)
    }

    /// Partition a full sheet into `block_width x block_height` tiles,
    /// deduplicate them by content, and build the index matrix (the save
    /// direction). The dedup hash is confirmed by byte comparison, so a
    /// hash collision can never merge two distinct tiles.
    pub fn build(
        sheet: &PixelBuffer,
        block_width: usize,
        block_height: usize,
    ) -> CodecResult<TileAtlas> {
        if block_width == 0
            || block_height == 0
            || sheet.width() % block_width != 0
            || sheet.height() % block_height != 0
        {
            return Err(CodecError::structural(
                "tile atlas",
                format!(
                    "sheet {}x{} does not divide into {}x{} tiles",
                    sheet.width(),
                    sheet.height(),
                    block_width,
                    block_height
                ),
            ));
        }

        let matrix_width = sheet.width() / block_width;
        let matrix_height = sheet.height() / block_height;
        let cell_count = matrix_width * matrix_height;
        if cell_count == 0 {
            return Err(CodecError::structural(
                "tile atlas",
                "sheet produces zero tiles".to_string(),
            ));
        }
        // Checked before any pixel copying: every cell could be unique.
        if cell_count > MAX_TILE_COUNT {
            return Err(CodecError::resource_limit(format!(
                "{} tiles exceed the i16 index range ({})",
                cell_count, MAX_TILE_COUNT
            )));
        }

        let flat = sheet.to_flat(true)?;
        let sheet_width = sheet.width();

        let mut seen: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut tiles: Vec<Vec<u8>> = Vec::new();
        let mut indices = vec![0i16; cell_count];

        // File order is column-major, so walk columns outermost.
        for col in 0..matrix_width {
            for row in 0..matrix_height {
                let mut block = Vec::with_capacity(block_width * block_height);
                for y in 0..block_height {
                    let src = (row * block_height + y) * sheet_width + col * block_width;
                    block.extend_from_slice(&flat[src..src + block_width]);
                }

                let mut hasher = XxHash64::default();
                hasher.write(&block);
                let hash = hasher.finish();

                let tile_index = match seen.entry(hash) {
                    Entry::Occupied(mut entry) => {
                        let bucket = entry.get_mut();
                        match bucket.iter().find(|&&idx| tiles[idx] == block) {
                            Some(&idx) => idx,
                            None => {
                                // Hash collision: still a distinct tile.
                                let idx = tiles.len();
                                tiles.push(block);
                                bucket.push(idx);
                                idx
                            }
                        }
                    }
                    Entry::Vacant(entry) => {
                        let idx = tiles.len();
                        tiles.push(block);
                        entry.insert(vec![idx]);
                        idx
                    }
                };
                indices[col * matrix_height + row] = tile_index as i16;
            }
        }

        debug!(
            cells = cell_count,
            unique = tiles.len(),
            "tile sheet deduplicated"
        );

        let palette = sheet.palette().map(|p| p.to_vec());
        let tiles = tiles
            .into_iter()
            .map(|data| PixelBuffer::from_flat(block_width, block_height, data, palette.clone()))
            .collect::<CodecResult<Vec<_>>>()?;

        Ok(TileAtlas {
            matrix_width,
            matrix_height,
            indices,
            tiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(fill: u8) -> PixelBuffer {
        PixelBuffer::from_flat(2, 2, vec![fill; 4], None).unwrap()
    }

    #[test]
    fn compose_follows_the_column_major_transpose() {
        // 2x2 matrix, indices [0, 1, 2, 3] in column-major file order.
        let atlas = TileAtlas {
            matrix_width: 2,
            matrix_height: 2,
            indices: vec![0, 1, 2, 3],
            tiles: vec![tile(0), tile(1), tile(2), tile(3)],
        };
        let sheet = atlas.compose(None).unwrap();
        // Tile 0 at (row 0, col 0), tile 1 at (row 1, col 0),
        // tile 2 at (row 0, col 1), tile 3 at (row 1, col 1).
        assert_eq!(
            sheet.data(),
            &[
                0, 0, 2, 2, //
                0, 0, 2, 2, //
                1, 1, 3, 3, //
                1, 1, 3, 3, //
            ]
        );
    }

    #[test]
    fn build_then_compose_is_identity() {
        let data: Vec<u8> = (0..64u8).collect();
        let sheet = PixelBuffer::from_flat(8, 8, data.clone(), None).unwrap();
        let atlas = TileAtlas::build(&sheet, 4, 4).unwrap();
        assert_eq!(atlas.tiles.len(), 4);
        let back = atlas.compose(None).unwrap();
        assert_eq!(back.data(), data.as_slice());
    }

    #[test]
    fn duplicate_tiles_collapse_and_dedup_is_idempotent() {
        // Four identical quadrants.
        let mut data = vec![0u8; 16];
        data[0] = 9;
        data[2] = 9;
        data[8] = 9;
        data[10] = 9;
        let sheet = PixelBuffer::from_flat(4, 4, data, None).unwrap();
        let atlas = TileAtlas::build(&sheet, 2, 2).unwrap();
        assert_eq!(atlas.tiles.len(), 1);
        assert_eq!(atlas.indices, vec![0, 0, 0, 0]);

        // Re-running the save step on the load output changes nothing.
        let recomposed = atlas.compose(None).unwrap();
        let again = TileAtlas::build(&recomposed, 2, 2).unwrap();
        assert_eq!(again.tiles.len(), atlas.tiles.len());
        assert_eq!(again.indices, atlas.indices);
    }

    #[test]
    fn tile_count_past_i16_range_is_rejected_before_copying() {
        // 200x200 of 1x1 tiles is 40000 cells, past the 32767 index range.
        let sheet = PixelBuffer::from_flat(200, 200, vec![0; 40_000], None).unwrap();
        let err = TileAtlas::build(&sheet, 1, 1).unwrap_err();
        assert!(matches!(err, CodecError::ResourceLimit { .. }));
    }

    #[test]
    fn mismatched_tile_sizes_fail_fast() {
        let atlas = TileAtlas {
            matrix_width: 2,
            matrix_height: 1,
            indices: vec![0, 1],
            tiles: vec![tile(0), PixelBuffer::from_flat(3, 2, vec![0; 6], None).unwrap()],
        };
        assert!(atlas.compose(None).is_err());
    }

    #[test]
    fn out_of_range_index_fails() {
        let atlas = TileAtlas {
            matrix_width: 1,
            matrix_height: 1,
            indices: vec![5],
            tiles: vec![tile(0)],
        };
        assert!(atlas.compose(None).is_err());
    }

    #[test]
    fn undersized_matrix_is_a_data_error() {
        let atlas = TileAtlas {
            matrix_width: 2,
            matrix_height: 2,
            indices: vec![0, 0],
            tiles: vec![tile(0)],
        };
        assert!(atlas.compose(None).is_err());
    }
}
