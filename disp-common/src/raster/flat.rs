//! Flat binary raster backend
//!
//! A raster is a little-endian `f32` data file in row-major order plus a JSON
//! header sidecar at `<data file>.json`. Block writes open their own file
//! handle, so workers writing disjoint windows need no shared state.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{MaskedBlock, RasterSink, RasterSource, Window};
use crate::{Error, Result};

const BYTES_PER_VALUE: u64 = 4;

/// Shape and georeferencing of a flat raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterHeader {
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub nodata: Option<f32>,
    /// GDAL-ordered affine transform
    #[serde(default)]
    pub geotransform: Option<[f64; 6]>,
    #[serde(default)]
    pub crs: Option<String>,
}

impl RasterHeader {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            nodata: None,
            geotransform: None,
            crs: None,
        }
    }

    pub fn with_nodata(mut self, nodata: f32) -> Self {
        self.nodata = Some(nodata);
        self
    }

    fn data_len(&self) -> u64 {
        self.rows as u64 * self.cols as u64 * BYTES_PER_VALUE
    }
}

/// Path of the header sidecar for a data file
pub fn header_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// On-disk single-band `f32` raster
#[derive(Debug, Clone)]
pub struct FlatRaster {
    path: PathBuf,
    header: RasterHeader,
}

impl FlatRaster {
    /// Open an existing raster and check the data file size against the header.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let header_file = header_path(&path);
        let content = fs::read_to_string(&header_file)
            .map_err(|e| Error::raster(&header_file, format!("cannot read header: {}", e)))?;
        let header: RasterHeader = serde_json::from_str(&content)
            .map_err(|e| Error::raster(&header_file, format!("invalid header: {}", e)))?;

        let actual = fs::metadata(&path)
            .map_err(|e| Error::raster(&path, format!("cannot stat data file: {}", e)))?
            .len();
        if actual != header.data_len() {
            return Err(Error::raster(
                &path,
                format!(
                    "data file holds {} bytes, header expects {} ({}x{})",
                    actual,
                    header.data_len(),
                    header.rows,
                    header.cols
                ),
            ));
        }
        Ok(Self { path, header })
    }

    /// Create a zero-filled raster with `header`, replacing any existing file.
    pub fn create(path: impl Into<PathBuf>, header: RasterHeader) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        file.set_len(header.data_len())?;
        fs::write(header_path(&path), serde_json::to_string_pretty(&header)?)?;
        Ok(Self { path, header })
    }

    /// Create a zero-filled raster with the shape and georeferencing of `like`.
    pub fn create_like(path: impl Into<PathBuf>, like: &FlatRaster) -> Result<Self> {
        Self::create(path, like.header.clone())
    }

    /// Write a whole array as a new raster.
    pub fn from_array(
        path: impl Into<PathBuf>,
        data: ArrayView2<'_, f32>,
        nodata: Option<f32>,
    ) -> Result<Self> {
        let (rows, cols) = data.dim();
        let mut header = RasterHeader::new(rows, cols);
        header.nodata = nodata;
        let raster = Self::create(path, header)?;
        raster.write_block(data, 0, 0)?;
        Ok(raster)
    }

    /// Whether both the data file and its header exist
    pub fn exists(path: &Path) -> bool {
        path.is_file() && header_path(path).is_file()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.header.rows, self.header.cols)
    }

    /// Read the entire raster without masking.
    pub fn read_all(&self) -> Result<Array2<f32>> {
        self.read_raw(Window::full(self.shape()))
    }

    fn offset(&self, row: usize, col: usize) -> u64 {
        (row as u64 * self.header.cols as u64 + col as u64) * BYTES_PER_VALUE
    }

    fn check_window(&self, window: Window) -> Result<()> {
        if window.fits(self.shape()) {
            Ok(())
        } else {
            Err(Error::raster(
                &self.path,
                format!(
                    "window {:?} outside raster of shape {:?}",
                    window,
                    self.shape()
                ),
            ))
        }
    }

    fn read_raw(&self, window: Window) -> Result<Array2<f32>> {
        self.check_window(window)?;
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut values = vec![0.0f32; window.rows * window.cols];

        for (i, row) in (window.row_start..window.row_end()).enumerate() {
            reader.seek(SeekFrom::Start(self.offset(row, window.col_start)))?;
            let dst = &mut values[i * window.cols..(i + 1) * window.cols];
            reader.read_f32_into::<LittleEndian>(dst)?;
        }

        Array2::from_shape_vec((window.rows, window.cols), values)
            .map_err(|e| Error::raster(&self.path, e.to_string()))
    }
}

impl RasterSource for FlatRaster {
    fn shape(&self) -> (usize, usize) {
        FlatRaster::shape(self)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_block(&self, window: Window) -> Result<MaskedBlock> {
        let data = self.read_raw(window)?;
        Ok(MaskedBlock::from_data(data, self.header.nodata))
    }
}

impl RasterSink for FlatRaster {
    fn shape(&self) -> (usize, usize) {
        FlatRaster::shape(self)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn write_block(
        &self,
        block: ArrayView2<'_, f32>,
        row_start: usize,
        col_start: usize,
    ) -> Result<()> {
        let (rows, cols) = block.dim();
        self.check_window(Window::new(row_start, col_start, rows, cols))?;

        let file = OpenOptions::new().write(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut buf: Vec<u8> = Vec::with_capacity(cols * BYTES_PER_VALUE as usize);

        for (i, row) in block.outer_iter().enumerate() {
            buf.clear();
            for &v in row.iter() {
                buf.write_f32::<LittleEndian>(v)?;
            }
            writer.seek(SeekFrom::Start(self.offset(row_start + i, col_start)))?;
            writer.write_all(&buf)?;
        }
        writer.flush()?;
        Ok(())
    }
}
