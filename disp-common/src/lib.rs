//! # DISP Common Library
//!
//! Stack bookkeeping shared by the displacement workflow:
//! - Epoch stack model and file naming convention
//! - Reference-date and parameter-override catalogs
//! - Reference index resolution for ministack processing
//! - Algorithm parameters with per-frame overrides
//! - Amplitude statistics fusion over a tiled raster boundary
//! - Run configuration loading

pub mod catalog;
pub mod config;
pub mod epoch;
pub mod error;
pub mod params;
pub mod raster;
pub mod reference;
pub mod stats;

pub use epoch::{Epoch, EpochStack};
pub use error::{Error, Result};
pub use params::AlgorithmParameters;
pub use reference::{CompressedSlcPlan, ReferenceResolution};
