//! Common error types for the displacement stack controller

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Common result type for stack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the workspace
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document could not be parsed or produced
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML document could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// More than one real (non-compressed) acquisition on the same date
    #[error("Duplicate dates passed: {}", format_duplicates(.0))]
    DuplicateDates(Vec<(NaiveDate, PathBuf)>),

    /// Weighting scheme name not recognized
    #[error("Unrecognized weight scheme: {0:?}")]
    UnknownWeightScheme(String),

    /// Compressed-SLC plan name not recognized
    #[error("Unrecognized compressed SLC plan: {0:?}")]
    UnknownCompressedSlcPlan(String),

    /// Mean/dispersion inputs are not pairwise co-registered
    #[error("Raster mismatch: {0}")]
    RasterMismatch(String),

    /// Raster backend failure (header, data layout, out-of-bounds window)
    #[error("Raster error at {path}: {message}")]
    Raster { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn raster(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Raster {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn format_duplicates(entries: &[(NaiveDate, PathBuf)]) -> String {
    entries
        .iter()
        .map(|(date, path)| format!("{} ({})", date, path.display()))
        .collect::<Vec<_>>()
        .join(", ")
}
