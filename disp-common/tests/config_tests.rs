//! Run configuration loading and scratch directory resolution
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate DISP_SCRATCH_PATH are marked with #[serial].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use disp_common::config::{
    resolve_scratch_path, RunConfig, DEFAULT_SCRATCH_PATH, SCRATCH_PATH_ENV,
};
use disp_common::Error;
use serial_test::serial;
use tempfile::TempDir;

const MINIMAL: &str = r#"
[input_file_group]
cslc_file_list = ["NISAR_F150_20200101T000000.h5", "NISAR_F150_20200113T000000.h5"]
frame_id = 150

[dynamic_ancillary_file_group]
algorithm_parameters_file = "params.toml"
"#;

#[test]
fn test_minimal_config() {
    let config = RunConfig::from_toml_str(MINIMAL).unwrap();
    assert_eq!(config.input_file_group.cslc_file_list.len(), 2);
    assert_eq!(config.frame_key(), "150");
    assert!(config.static_ancillary_file_group.reference_date_database_json.is_none());
    assert!(config.product_path_group.scratch_path.is_none());
    assert!(config.ps_statistics_group.is_none());
    assert!(config.log_file.is_none());
}

#[test]
fn test_full_config() {
    let content = r#"
log_file = "/tmp/run.log"

[input_file_group]
cslc_file_list = ["compressed_F150_20200101_20200101_20200301.h5", "NISAR_F150_20200313T000000.h5"]
frame_id = 150

[dynamic_ancillary_file_group]
algorithm_parameters_file = "/data/params.json"

[static_ancillary_file_group]
reference_date_database_json = "/data/reference_dates.json"

[product_path_group]
scratch_path = "/scratch/run1"
output_directory = "/out"

[ps_statistics_group]
amplitude_mean_file = "/scratch/amp_mean.f32"
amplitude_dispersion_file = "/scratch/amp_dispersion.f32"
compressed_amplitude_mean_files = ["/prev/combined_mean.f32"]
compressed_amplitude_dispersion_files = ["/prev/combined_dispersion.f32"]
"#;
    let config = RunConfig::from_toml_str(content).unwrap();
    let ps = config.ps_statistics_group.as_ref().unwrap();
    let compressed = ps.compressed().unwrap().unwrap();
    assert_eq!(compressed.len(), 1);
    assert_eq!(compressed[0].mean, PathBuf::from("/prev/combined_mean.f32"));
    assert_eq!(ps.current().dispersion, PathBuf::from("/scratch/amp_dispersion.f32"));
    assert_eq!(config.log_file, Some(PathBuf::from("/tmp/run.log")));
}

#[test]
fn test_empty_file_list_rejected() {
    let content = MINIMAL.replace(
        r#"["NISAR_F150_20200101T000000.h5", "NISAR_F150_20200113T000000.h5"]"#,
        "[]",
    );
    assert!(matches!(
        RunConfig::from_toml_str(&content),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_unknown_key_rejected() {
    let content = format!("{}\nunexpected = 1\n", MINIMAL);
    assert!(RunConfig::from_toml_str(&content).is_err());
}

#[test]
fn test_unbalanced_compressed_lists_rejected() {
    let content = format!(
        "{}\n{}",
        MINIMAL,
        r#"
[ps_statistics_group]
amplitude_mean_file = "m.f32"
amplitude_dispersion_file = "d.f32"
compressed_amplitude_mean_files = ["a.f32", "b.f32"]
compressed_amplitude_dispersion_files = ["a_d.f32"]
"#
    );
    assert!(matches!(
        RunConfig::from_toml_str(&content),
        Err(Error::RasterMismatch(_))
    ));
}

#[test]
fn test_relative_paths_follow_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("runconfig.toml");
    fs::write(&path, MINIMAL).unwrap();

    let config = RunConfig::from_file(&path).unwrap();
    assert_eq!(
        config.dynamic_ancillary_file_group.algorithm_parameters_file,
        dir.path().join("params.toml")
    );
    assert!(config
        .input_file_group
        .cslc_file_list
        .iter()
        .all(|p| p.starts_with(dir.path())));
}

#[test]
fn test_missing_config_file() {
    assert!(matches!(
        RunConfig::from_file("/nonexistent/runconfig.toml"),
        Err(Error::Config(_))
    ));
}

#[test]
#[serial]
fn test_scratch_default() {
    env::remove_var(SCRATCH_PATH_ENV);
    assert_eq!(resolve_scratch_path(None, None), PathBuf::from(DEFAULT_SCRATCH_PATH));
}

#[test]
#[serial]
fn test_scratch_priority_order() {
    let content = format!("{}\n[product_path_group]\nscratch_path = \"/from/config\"\n", MINIMAL);
    let config = RunConfig::from_toml_str(&content).unwrap();

    env::remove_var(SCRATCH_PATH_ENV);
    assert_eq!(
        resolve_scratch_path(None, Some(&config)),
        PathBuf::from("/from/config")
    );

    env::set_var(SCRATCH_PATH_ENV, "/from/env");
    assert_eq!(
        resolve_scratch_path(None, Some(&config)),
        PathBuf::from("/from/env")
    );

    assert_eq!(
        resolve_scratch_path(Some(Path::new("/from/cli")), Some(&config)),
        PathBuf::from("/from/cli")
    );

    // Cleanup
    env::remove_var(SCRATCH_PATH_ENV);
}

#[test]
#[serial]
fn test_scratch_empty_env_ignored() {
    env::set_var(SCRATCH_PATH_ENV, "");
    assert_eq!(resolve_scratch_path(None, None), PathBuf::from(DEFAULT_SCRATCH_PATH));
    env::remove_var(SCRATCH_PATH_ENV);
}
