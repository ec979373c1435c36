//! In-memory raster backend

use std::sync::RwLock;

use ndarray::{s, Array2, ArrayView2};

use super::{MaskedBlock, RasterSink, RasterSource, Window};
use crate::{Error, Result};

/// Raster held in memory behind a lock
#[derive(Debug)]
pub struct MemoryRaster {
    name: String,
    nodata: Option<f32>,
    data: RwLock<Array2<f32>>,
}

impl MemoryRaster {
    pub fn new(name: impl Into<String>, data: Array2<f32>) -> Self {
        Self {
            name: name.into(),
            nodata: None,
            data: RwLock::new(data),
        }
    }

    /// Zero-filled raster of `shape`
    pub fn zeros(name: impl Into<String>, shape: (usize, usize)) -> Self {
        Self::new(name, Array2::zeros(shape))
    }

    pub fn with_nodata(mut self, nodata: f32) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.read().map(|d| d.dim()).unwrap_or((0, 0))
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Result<Array2<f32>> {
        self.data
            .read()
            .map(|d| d.clone())
            .map_err(|_| Error::raster(&self.name, "lock poisoned"))
    }

    fn check_window(&self, window: Window) -> Result<()> {
        if window.fits(self.shape()) {
            Ok(())
        } else {
            Err(Error::raster(
                &self.name,
                format!("window {:?} outside raster of shape {:?}", window, self.shape()),
            ))
        }
    }
}

impl RasterSource for MemoryRaster {
    fn shape(&self) -> (usize, usize) {
        MemoryRaster::shape(self)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn read_block(&self, window: Window) -> Result<MaskedBlock> {
        self.check_window(window)?;
        let data = self
            .data
            .read()
            .map_err(|_| Error::raster(&self.name, "lock poisoned"))?;
        let block = data
            .slice(s![window.row_start..window.row_end(), window.col_start..window.col_end()])
            .to_owned();
        Ok(MaskedBlock::from_data(block, self.nodata))
    }
}

impl RasterSink for MemoryRaster {
    fn shape(&self) -> (usize, usize) {
        MemoryRaster::shape(self)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn write_block(
        &self,
        block: ArrayView2<'_, f32>,
        row_start: usize,
        col_start: usize,
    ) -> Result<()> {
        let (rows, cols) = block.dim();
        let window = Window::new(row_start, col_start, rows, cols);
        self.check_window(window)?;
        let mut data = self
            .data
            .write()
            .map_err(|_| Error::raster(&self.name, "lock poisoned"))?;
        data.slice_mut(s![window.row_start..window.row_end(), window.col_start..window.col_end()])
            .assign(&block);
        Ok(())
    }
}
