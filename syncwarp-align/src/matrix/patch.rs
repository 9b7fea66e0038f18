//! Tiled sparse cost matrix

use super::CostMatrix;
use std::collections::HashMap;

/// Default edge length of a square tile
pub const DEFAULT_TILE_SIZE: usize = 64;

/// Sparse matrix partitioned into square tiles allocated on first write.
///
/// Reads from tiles that were never allocated return the default without
/// allocating.
#[derive(Debug, Clone)]
pub struct PatchMatrix<T> {
    tile_size: usize,
    tiles: HashMap<(usize, usize), Box<[T]>>,
    default: T,
    extent_i: usize,
    extent_j: usize,
}

impl<T: Copy> PatchMatrix<T> {
    pub fn new(default: T) -> Self {
        Self::with_tile_size(DEFAULT_TILE_SIZE, default)
    }

    /// # Panics
    ///
    /// Panics if `tile_size` is zero.
    pub fn with_tile_size(tile_size: usize, default: T) -> Self {
        assert!(tile_size > 0, "tile size must be non-zero");
        Self {
            tile_size,
            tiles: HashMap::new(),
            default,
            extent_i: 0,
            extent_j: 0,
        }
    }

    /// Number of allocated tiles
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    fn locate(&self, i: usize, j: usize) -> ((usize, usize), usize) {
        let size = self.tile_size;
        ((i / size, j / size), (i % size) * size + j % size)
    }
}

impl<T: Copy> CostMatrix<T> for PatchMatrix<T> {
    fn get(&self, i: usize, j: usize) -> T {
        let (tile, offset) = self.locate(i, j);
        self.tiles
            .get(&tile)
            .map(|cells| cells[offset])
            .unwrap_or(self.default)
    }

    fn set(&mut self, i: usize, j: usize, value: T) {
        let (tile, offset) = self.locate(i, j);
        let (cells_per_tile, default) = (self.tile_size * self.tile_size, self.default);
        let cells = self
            .tiles
            .entry(tile)
            .or_insert_with(|| vec![default; cells_per_tile].into_boxed_slice());
        cells[offset] = value;
        self.extent_i = self.extent_i.max(i + 1);
        self.extent_j = self.extent_j.max(j + 1);
    }

    fn extent_i(&self) -> usize {
        self.extent_i
    }

    fn extent_j(&self) -> usize {
        self.extent_j
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_do_not_allocate() {
        let m = PatchMatrix::new(f32::INFINITY);
        assert_eq!(m.get(1000, 2000), f32::INFINITY);
        assert_eq!(m.tile_count(), 0);
    }

    #[test]
    fn test_new_tile_is_filled_with_default() {
        let mut m = PatchMatrix::with_tile_size(4, f32::INFINITY);
        m.set(5, 6, 1.5);
        assert_eq!(m.tile_count(), 1);
        assert_eq!(m.get(5, 6), 1.5);
        assert_eq!(m.get(4, 4), f32::INFINITY);
        assert_eq!(m.get(7, 7), f32::INFINITY);
    }

    #[test]
    fn test_banded_writes_allocate_few_tiles() {
        let mut m = PatchMatrix::with_tile_size(8, 0u32);
        for i in 0..64 {
            m.set(i, i, i as u32);
        }
        assert_eq!(m.tile_count(), 8);
        assert_eq!(m.get(63, 63), 63);
        assert_eq!(m.extent_i(), 64);
        assert_eq!(m.extent_j(), 64);
    }
}
