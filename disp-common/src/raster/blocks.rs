//! Tiling of a raster into disjoint blocks

use super::Window;

/// Row-major iteration over blocks that exactly cover a raster
///
/// Edge blocks are truncated; no two blocks overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockManager {
    shape: (usize, usize),
    block_shape: (usize, usize),
}

impl BlockManager {
    /// Zero block dimensions are raised to 1.
    pub fn new(shape: (usize, usize), block_shape: (usize, usize)) -> Self {
        Self {
            shape,
            block_shape: (block_shape.0.max(1), block_shape.1.max(1)),
        }
    }

    pub fn num_blocks(&self) -> usize {
        let (rows, cols) = self.shape;
        rows.div_ceil(self.block_shape.0) * cols.div_ceil(self.block_shape.1)
    }

    pub fn iter_blocks(&self) -> impl Iterator<Item = Window> + '_ {
        let (rows, cols) = self.shape;
        let (block_rows, block_cols) = self.block_shape;
        (0..rows).step_by(block_rows).flat_map(move |r| {
            (0..cols).step_by(block_cols).map(move |c| {
                Window::new(r, c, block_rows.min(rows - r), block_cols.min(cols - c))
            })
        })
    }

    pub fn blocks(&self) -> Vec<Window> {
        self.iter_blocks().collect()
    }
}
