//! Algorithm parameter tree
//!
//! Parameters are loaded as a generic tree, receive frame-specific
//! overrides (see [`merge`]), and are then deserialized into
//! [`AlgorithmParameters`]. Every field has a default so a partial file is
//! valid; unknown keys are rejected.
//!
//! # Usage
//!
//! ```rust,no_run
//! use disp_common::params::AlgorithmParameters;
//!
//! let params = AlgorithmParameters::from_file("algorithm_parameters.toml")?
//!     .with_frame_overrides("23210")?;
//! println!("plan = {}", params.phase_linking.compressed_slc_plan);
//! # Ok::<(), disp_common::Error>(())
//! ```

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::reference::CompressedSlcPlan;
use crate::stats::WeightScheme;

mod init;
pub mod merge;

pub use merge::merge;

/// Dataset path inside the input GSLC files
pub const DEFAULT_SUBDATASET: &str = "/science/LSAR/GSLC/grids/frequencyA/HH";

/// Amplitude dispersion threshold used for the very first ministack, where
/// the amplitude estimate is weak
pub const FIRST_MINISTACK_AMP_DISPERSION_THRESHOLD: f64 = 0.15;

/// Every option group consumed by the displacement workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlgorithmParameters {
    /// JSON file with frame-specific overrides of these parameters
    pub algorithm_parameters_overrides_json: Option<PathBuf>,

    pub ps_options: PsOptions,
    pub phase_linking: PhaseLinkingOptions,
    pub output_options: OutputOptions,
    pub worker_settings: WorkerSettings,

    /// Passed through untouched to the interferogram network stage
    pub interferogram_network: Map<String, Value>,
    /// Passed through untouched to the unwrapping stage
    pub unwrap_options: Map<String, Value>,
    /// Passed through untouched to the timeseries inversion stage
    pub timeseries_options: Map<String, Value>,

    /// Name of the subdataset to use in the input files
    pub subdataset: String,

    /// Valid range: [0.0, 1.0]
    /// Default: 0.6
    pub recommended_temporal_coherence_threshold: f64,

    /// Valid range: [0.0, 1.0]
    /// Default: 0.5
    pub recommended_similarity_threshold: f64,

    /// Spatial wavelength cutoff (meters) for the short wavelength layer
    ///
    /// Default: 25000
    pub spatial_wavelength_cutoff: f64,

    /// Number of output products to create in parallel
    ///
    /// Valid range: >= 1
    /// Default: 3
    pub num_parallel_products: usize,
}

impl Default for AlgorithmParameters {
    fn default() -> Self {
        Self {
            algorithm_parameters_overrides_json: None,
            ps_options: PsOptions::default(),
            phase_linking: PhaseLinkingOptions::default(),
            output_options: OutputOptions::default(),
            worker_settings: WorkerSettings::default(),
            interferogram_network: Map::new(),
            unwrap_options: Map::new(),
            timeseries_options: Map::new(),
            subdataset: DEFAULT_SUBDATASET.to_string(),
            recommended_temporal_coherence_threshold: 0.6,
            recommended_similarity_threshold: 0.5,
            spatial_wavelength_cutoff: 25_000.0,
            num_parallel_products: 3,
        }
    }
}

/// Persistent scatterer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PsOptions {
    /// Pixels with amplitude dispersion below this are persistent scatterers
    ///
    /// Valid range: (0.0, 1.0]
    /// Default: 0.25
    pub amp_dispersion_threshold: f64,

    /// Weighting of older compressed statistics against the current ministack
    ///
    /// Default: exponential
    pub weight_scheme: WeightScheme,
}

impl Default for PsOptions {
    fn default() -> Self {
        Self {
            amp_dispersion_threshold: 0.25,
            weight_scheme: WeightScheme::default(),
        }
    }
}

/// Phase linking options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhaseLinkingOptions {
    /// Valid range: >= 2
    /// Default: 15
    pub ministack_size: usize,

    /// Default: always_first
    pub compressed_slc_plan: CompressedSlcPlan,

    /// Filled in by reference resolution
    pub output_reference_idx: usize,
}

impl Default for PhaseLinkingOptions {
    fn default() -> Self {
        Self {
            ministack_size: 15,
            compressed_slc_plan: CompressedSlcPlan::default(),
            output_reference_idx: 0,
        }
    }
}

/// Output options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputOptions {
    /// Filled in by reference resolution
    pub extra_reference_date: Option<NaiveDate>,
}

/// Block processing options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSettings {
    /// Tile shape (rows, cols) for block-wise raster processing
    ///
    /// Valid range: both >= 1
    /// Default: [256, 256]
    pub block_shape: [usize; 2],

    /// Tiles processed concurrently
    ///
    /// Valid range: >= 1
    /// Default: 4
    pub n_workers: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            block_shape: [256, 256],
            n_workers: 4,
        }
    }
}
