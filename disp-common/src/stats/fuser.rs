//! Tile-by-tile fusion of amplitude statistics across ministacks
//!
//! The current ministack's mean/dispersion pair is combined with the pairs
//! carried by earlier compressed epochs. Only one tile of every input is held
//! in memory at a time. Tiles are a disjoint cover of the raster, so workers
//! write their output regions without coordination.
//!
//! A completed run leaves a marker file beside the dispersion output. Outputs
//! without a matching marker are treated as partial and recomputed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use ndarray::{Array3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

use super::combine::combine_amplitude_dispersions;
use super::weighting::WeightScheme;
use crate::raster::{BlockManager, FlatRaster, RasterSink, RasterSource, Window};
use crate::{Error, Result};

pub const COMBINED_DISPERSION_NAME: &str = "combined_dispersion.f32";
pub const COMBINED_MEAN_NAME: &str = "combined_mean.f32";
pub const COMPLETION_MARKER_NAME: &str = "combined_stats.complete.json";

/// Mean and dispersion of one image, as paths or as opened rasters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsPair<R = PathBuf> {
    pub mean: R,
    pub dispersion: R,
}

impl<R> StatisticsPair<R> {
    pub fn new(mean: R, dispersion: R) -> Self {
        Self { mean, dispersion }
    }
}

/// Locations of the fused rasters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusedStatistics {
    pub dispersion: PathBuf,
    pub mean: PathBuf,
}

impl FusedStatistics {
    /// Output locations for a current pair: each output sits next to its input.
    pub fn beside(current: &StatisticsPair) -> Self {
        Self {
            dispersion: sibling(&current.dispersion, COMBINED_DISPERSION_NAME),
            mean: sibling(&current.mean, COMBINED_MEAN_NAME),
        }
    }

    pub fn marker_path(&self) -> PathBuf {
        sibling(&self.dispersion, COMPLETION_MARKER_NAME)
    }
}

/// Whether the fused rasters were produced by this call or reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuseOutcome {
    Computed(FusedStatistics),
    Skipped(FusedStatistics),
}

impl FuseOutcome {
    pub fn statistics(&self) -> &FusedStatistics {
        match self {
            FuseOutcome::Computed(s) | FuseOutcome::Skipped(s) => s,
        }
    }

    pub fn into_statistics(self) -> FusedStatistics {
        match self {
            FuseOutcome::Computed(s) | FuseOutcome::Skipped(s) => s,
        }
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self, FuseOutcome::Skipped(_))
    }
}

/// Record of a finished fusion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub run_id: Uuid,
    pub weight_scheme: WeightScheme,
    pub num_slc: usize,
    pub weights: Vec<f64>,
    /// Inputs oldest first; the last pair is the current ministack
    pub inputs: Vec<StatisticsPair>,
    pub outputs: FusedStatistics,
    pub finished_at: DateTime<Utc>,
}

impl CompletionMarker {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write through a temporary file and rename so readers never see a
    /// half-written marker.
    fn write_atomic(&self, path: &Path) -> Result<()> {
        let tmp = sibling(path, &format!(".{}.tmp", self.run_id));
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Combines amplitude statistics of the current ministack with those of
/// prior compressed epochs.
#[derive(Debug, Clone)]
pub struct StatisticsFuser {
    span: Span,
    weight_scheme: WeightScheme,
    block_shape: (usize, usize),
    n_workers: usize,
}

impl StatisticsFuser {
    pub fn new(span: Span, weight_scheme: WeightScheme) -> Self {
        Self {
            span,
            weight_scheme,
            block_shape: (256, 256),
            n_workers: 1,
        }
    }

    pub fn with_block_shape(mut self, block_shape: (usize, usize)) -> Self {
        self.block_shape = block_shape;
        self
    }

    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers.max(1);
        self
    }

    pub fn weight_scheme(&self) -> WeightScheme {
        self.weight_scheme
    }

    /// Fuse on-disk rasters, writing `combined_dispersion.f32` and
    /// `combined_mean.f32` beside the current inputs.
    ///
    /// `compressed` is ordered oldest first. `num_slc` is the number of real
    /// acquisitions behind the current pair. A previous complete run with the
    /// same outputs is reused as is; staleness is the caller's concern.
    pub fn fuse(
        &self,
        current: &StatisticsPair,
        compressed: &[StatisticsPair],
        num_slc: usize,
    ) -> Result<FuseOutcome> {
        let _enter = self.span.enter();
        let outputs = FusedStatistics::beside(current);

        if self.is_complete(&outputs) {
            tracing::info!(
                "Combined statistics already present, skipping: {}, {}",
                outputs.dispersion.display(),
                outputs.mean.display()
            );
            return Ok(FuseOutcome::Skipped(outputs));
        }

        let current_mean = FlatRaster::open(&current.mean)?;
        let current_dispersion = FlatRaster::open(&current.dispersion)?;
        let opened = compressed
            .iter()
            .map(|pair| {
                Ok(StatisticsPair::new(
                    FlatRaster::open(&pair.mean)?,
                    FlatRaster::open(&pair.dispersion)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let current_sources = StatisticsPair::new(
            &current_mean as &dyn RasterSource,
            &current_dispersion as &dyn RasterSource,
        );
        let compressed_sources: Vec<StatisticsPair<&dyn RasterSource>> = opened
            .iter()
            .map(|p| StatisticsPair::new(&p.mean as &dyn RasterSource, &p.dispersion as &dyn RasterSource))
            .collect();

        // Inputs are checked before any existing output is truncated.
        let mut images = compressed_sources.clone();
        images.push(current_sources.clone());
        check_inputs(current_mean.shape(), &images)?;

        // A stale marker must not outlive the outputs it describes.
        let marker_path = outputs.marker_path();
        if marker_path.exists() {
            fs::remove_file(&marker_path)?;
        }

        let out_dispersion = FlatRaster::create_like(&outputs.dispersion, &current_dispersion)?;
        let out_mean = FlatRaster::create_like(&outputs.mean, &current_mean)?;

        let weights = self.fuse_sources(
            current_sources,
            &compressed_sources,
            num_slc,
            &out_dispersion,
            &out_mean,
        )?;

        let mut inputs = compressed.to_vec();
        inputs.push(current.clone());
        let marker = CompletionMarker {
            run_id: Uuid::new_v4(),
            weight_scheme: self.weight_scheme,
            num_slc,
            weights,
            inputs,
            outputs: outputs.clone(),
            finished_at: Utc::now(),
        };
        marker.write_atomic(&marker_path)?;
        tracing::debug!(run_id = %marker.run_id, "Wrote completion marker {}", marker_path.display());

        Ok(FuseOutcome::Computed(outputs))
    }

    /// Fuse arbitrary raster backends tile by tile.
    ///
    /// Returns the per-image weights, oldest first.
    pub fn fuse_sources(
        &self,
        current: StatisticsPair<&dyn RasterSource>,
        compressed: &[StatisticsPair<&dyn RasterSource>],
        num_slc: usize,
        out_dispersion: &dyn RasterSink,
        out_mean: &dyn RasterSink,
    ) -> Result<Vec<f64>> {
        let _enter = self.span.enter();
        let shape = current.mean.shape();

        let mut images: Vec<StatisticsPair<&dyn RasterSource>> = compressed.to_vec();
        images.push(current);
        check_shapes(shape, &images, out_dispersion, out_mean)?;

        let weights = self.weight_scheme.weights(images.len(), num_slc);
        let manager = BlockManager::new(shape, self.block_shape);
        let windows = manager.blocks();
        let total = windows.len();

        tracing::info!(
            "Combining amplitude statistics of {} images ({} compressed) over {} tiles | scheme: {} | weights: {:?}",
            images.len(),
            compressed.len(),
            total,
            self.weight_scheme,
            weights
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_workers)
            .build()
            .map_err(|e| Error::Config(format!("cannot build worker pool: {}", e)))?;

        let start = Instant::now();
        let done = AtomicUsize::new(0);
        let num_compressed = compressed.len();

        pool.install(|| {
            windows.par_iter().try_for_each(|&window| {
                self.span.in_scope(|| {
                    fuse_tile(&images, num_compressed, &weights, window, out_dispersion, out_mean)?;
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if finished % 100 == 0 {
                        tracing::debug!("Combined {}/{} tiles", finished, total);
                    }
                    Ok::<(), Error>(())
                })
            })
        })?;

        tracing::info!(
            "Combined {} tiles in {:?}",
            done.load(Ordering::Relaxed),
            start.elapsed()
        );
        Ok(weights)
    }

    /// Both outputs exist and a marker names exactly those outputs.
    fn is_complete(&self, outputs: &FusedStatistics) -> bool {
        if !FlatRaster::exists(&outputs.dispersion) || !FlatRaster::exists(&outputs.mean) {
            return false;
        }
        let marker_path = outputs.marker_path();
        match CompletionMarker::load(&marker_path) {
            Ok(marker) => &marker.outputs == outputs,
            Err(e) => {
                if marker_path.exists() {
                    tracing::warn!("Ignoring unreadable marker {}: {}", marker_path.display(), e);
                } else {
                    tracing::info!(
                        "Combined outputs exist without a completion marker; recomputing"
                    );
                }
                false
            }
        }
    }
}

fn check_shapes(
    shape: (usize, usize),
    images: &[StatisticsPair<&dyn RasterSource>],
    out_dispersion: &dyn RasterSink,
    out_mean: &dyn RasterSink,
) -> Result<()> {
    check_inputs(shape, images)?;
    for sink in [out_dispersion, out_mean] {
        if sink.shape() != shape {
            return Err(Error::RasterMismatch(format!(
                "output {} has shape {:?}, expected {:?}",
                sink.describe(),
                sink.shape(),
                shape
            )));
        }
    }
    Ok(())
}

/// Every input must share the current mean's shape.
fn check_inputs(shape: (usize, usize), images: &[StatisticsPair<&dyn RasterSource>]) -> Result<()> {
    let inputs = images.iter().flat_map(|p| [p.mean, p.dispersion]);
    for source in inputs {
        if source.shape() != shape {
            return Err(Error::RasterMismatch(format!(
                "{} has shape {:?}, expected {:?}",
                source.describe(),
                source.shape(),
                shape
            )));
        }
    }
    Ok(())
}

/// Read one window of every image, combine it and write both outputs.
fn fuse_tile(
    images: &[StatisticsPair<&dyn RasterSource>],
    num_compressed: usize,
    weights: &[f64],
    window: Window,
    out_dispersion: &dyn RasterSink,
    out_mean: &dyn RasterSink,
) -> Result<()> {
    let dims = (images.len(), window.rows, window.cols);
    let mut means = Array3::<f32>::zeros(dims);
    let mut dispersions = Array3::<f32>::zeros(dims);

    for (i, pair) in images.iter().enumerate() {
        let mut mean = pair.mean.read_block(window)?.filled(0.0);
        if i < num_compressed {
            mean.mapv_inplace(f32::abs);
        }
        means.index_axis_mut(Axis(0), i).assign(&mean);
        dispersions
            .index_axis_mut(Axis(0), i)
            .assign(&pair.dispersion.read_block(window)?.filled(0.0));
    }

    let (dispersion, mean) =
        combine_amplitude_dispersions(dispersions.view(), means.view(), weights)?;
    out_dispersion.write_block(dispersion.view(), window.row_start, window.col_start)?;
    out_mean.write_block(mean.view(), window.row_start, window.col_start)?;
    Ok(())
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}
