//! Raster I/O boundary
//!
//! The fuser only needs masked rectangular reads from single-band inputs and
//! rectangular writes into outputs. Any backend satisfying [`RasterSource`]
//! and [`RasterSink`] is interchangeable; [`FlatRaster`] stores data on disk
//! and [`MemoryRaster`] keeps it in memory.

use ndarray::{Array2, ArrayView2};

use crate::Result;

pub mod blocks;
pub mod flat;
pub mod memory;

pub use blocks::BlockManager;
pub use flat::{FlatRaster, RasterHeader};
pub use memory::MemoryRaster;

/// Rectangular region of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub row_start: usize,
    pub col_start: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Window {
    pub fn new(row_start: usize, col_start: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_start,
            col_start,
            rows,
            cols,
        }
    }

    /// Window covering a whole raster of `shape`
    pub fn full(shape: (usize, usize)) -> Self {
        Self::new(0, 0, shape.0, shape.1)
    }

    pub fn row_end(&self) -> usize {
        self.row_start + self.rows
    }

    pub fn col_end(&self) -> usize {
        self.col_start + self.cols
    }

    /// Whether the window lies inside a raster of `shape`
    pub fn fits(&self, shape: (usize, usize)) -> bool {
        self.row_end() <= shape.0 && self.col_end() <= shape.1
    }
}

/// Block of values plus a mask that is `true` where the value is invalid
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedBlock {
    pub data: Array2<f32>,
    pub mask: Array2<bool>,
}

impl MaskedBlock {
    /// Mask NaN and `nodata` values in `data`.
    pub fn from_data(data: Array2<f32>, nodata: Option<f32>) -> Self {
        let mask = data.mapv(|v| v.is_nan() || nodata.map_or(false, |nd| v == nd));
        Self { data, mask }
    }

    /// Data with invalid values replaced by `fill`
    pub fn filled(&self, fill: f32) -> Array2<f32> {
        let mut out = self.data.clone();
        out.zip_mut_with(&self.mask, |v, &masked| {
            if masked {
                *v = fill;
            }
        });
        out
    }
}

/// Single-band raster that supports masked block reads
pub trait RasterSource: Send + Sync {
    /// (rows, cols)
    fn shape(&self) -> (usize, usize);

    /// Human-readable name for logs and errors
    fn describe(&self) -> String;

    fn read_block(&self, window: Window) -> Result<MaskedBlock>;
}

/// Single-band raster that accepts block writes
///
/// Writes to disjoint windows may happen concurrently.
pub trait RasterSink: Send + Sync {
    /// (rows, cols)
    fn shape(&self) -> (usize, usize);

    fn describe(&self) -> String;

    fn write_block(&self, block: ArrayView2<'_, f32>, row_start: usize, col_start: usize)
        -> Result<()>;
}
