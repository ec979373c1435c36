//! Run configuration loading and scratch directory resolution

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::stats::StatisticsPair;
use crate::{Error, Result};

/// Environment variable consulted for the scratch directory
pub const SCRATCH_PATH_ENV: &str = "DISP_SCRATCH_PATH";

/// Compiled fallback for the scratch directory
pub const DEFAULT_SCRATCH_PATH: &str = "./scratch";

/// Inputs of one displacement run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub input_file_group: InputFileGroup,
    pub dynamic_ancillary_file_group: DynamicAncillaryFileGroup,
    #[serde(default)]
    pub static_ancillary_file_group: StaticAncillaryFileGroup,
    #[serde(default)]
    pub product_path_group: ProductPathGroup,
    #[serde(default)]
    pub ps_statistics_group: Option<PsStatisticsGroup>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputFileGroup {
    /// Acquisitions and compressed epochs, in any order
    pub cslc_file_list: Vec<PathBuf>,
    pub frame_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicAncillaryFileGroup {
    pub algorithm_parameters_file: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticAncillaryFileGroup {
    /// Frame id -> list of requested reference changeover dates
    pub reference_date_database_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProductPathGroup {
    pub scratch_path: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
}

/// Amplitude statistics of the current ministack and, optionally, of each
/// compressed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PsStatisticsGroup {
    pub amplitude_mean_file: PathBuf,
    pub amplitude_dispersion_file: PathBuf,
    /// Ordered like the compressed epochs of the sorted stack. When empty,
    /// the `<stem>.amp_mean.f32` sidecar of each compressed epoch is used.
    #[serde(default)]
    pub compressed_amplitude_mean_files: Vec<PathBuf>,
    #[serde(default)]
    pub compressed_amplitude_dispersion_files: Vec<PathBuf>,
}

impl PsStatisticsGroup {
    pub fn current(&self) -> StatisticsPair {
        StatisticsPair::new(
            self.amplitude_mean_file.clone(),
            self.amplitude_dispersion_file.clone(),
        )
    }

    /// Explicit compressed pairs, or `None` when none were listed
    pub fn compressed(&self) -> Result<Option<Vec<StatisticsPair>>> {
        let means = &self.compressed_amplitude_mean_files;
        let dispersions = &self.compressed_amplitude_dispersion_files;
        if means.len() != dispersions.len() {
            return Err(Error::RasterMismatch(format!(
                "{} compressed mean files but {} compressed dispersion files",
                means.len(),
                dispersions.len()
            )));
        }
        if means.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            means
                .iter()
                .zip(dispersions)
                .map(|(m, d)| StatisticsPair::new(m.clone(), d.clone()))
                .collect(),
        ))
    }
}

impl RunConfig {
    /// Load a TOML run configuration. Relative paths are taken relative to
    /// the directory holding the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn frame_key(&self) -> String {
        self.input_file_group.frame_id.to_string()
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_file_group.cslc_file_list.is_empty() {
            return Err(Error::Config(
                "input_file_group.cslc_file_list must not be empty".to_string(),
            ));
        }
        if let Some(ps) = &self.ps_statistics_group {
            ps.compressed()?;
        }
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.input_file_group.cslc_file_list.iter_mut().for_each(join);
        join(&mut self.dynamic_ancillary_file_group.algorithm_parameters_file);
        self.static_ancillary_file_group
            .reference_date_database_json
            .iter_mut()
            .for_each(join);
        self.product_path_group.scratch_path.iter_mut().for_each(join);
        self.product_path_group.output_directory.iter_mut().for_each(join);
        if let Some(ps) = &mut self.ps_statistics_group {
            join(&mut ps.amplitude_mean_file);
            join(&mut ps.amplitude_dispersion_file);
            ps.compressed_amplitude_mean_files.iter_mut().for_each(join);
            ps.compressed_amplitude_dispersion_files.iter_mut().for_each(join);
        }
        self.log_file.iter_mut().for_each(join);
    }
}

/// Scratch directory resolution, in priority order:
/// 1. Command-line argument
/// 2. `DISP_SCRATCH_PATH` environment variable
/// 3. Run configuration
/// 4. Compiled default
pub fn resolve_scratch_path(cli_arg: Option<&Path>, config: Option<&RunConfig>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(SCRATCH_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config.and_then(|c| c.product_path_group.scratch_path.as_ref()) {
        return path.clone();
    }

    PathBuf::from(DEFAULT_SCRATCH_PATH)
}
