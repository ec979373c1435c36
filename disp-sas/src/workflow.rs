//! Preparation of one displacement run
//!
//! Turns a run configuration into the fully resolved inputs of the
//! downstream processing stages: the sorted stack, parameters with frame
//! overrides applied, the phase reference choice and the amplitude
//! statistics used for persistent scatterer selection.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use disp_common::catalog::load_reference_dates;
use disp_common::config::{PsStatisticsGroup, RunConfig};
use disp_common::params::FIRST_MINISTACK_AMP_DISPERSION_THRESHOLD;
use disp_common::reference::resolve;
use disp_common::stats::{FusedStatistics, StatisticsFuser, StatisticsPair};
use disp_common::{AlgorithmParameters, EpochStack, ReferenceResolution};

pub const RESOLVED_WORKFLOW_NAME: &str = "resolved_workflow.json";

/// Everything the downstream stages need, after all lookups are done
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedWorkflow {
    pub frame_id: u32,
    /// Input files in stack order
    pub cslc_file_list: Vec<PathBuf>,
    pub reference: ResolvedReference,
    /// Fused amplitude statistics; absent for a first ministack
    pub amplitude_statistics: Option<FusedStatistics>,
    pub algorithm_parameters: AlgorithmParameters,
    pub scratch_path: PathBuf,
    pub output_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReference {
    #[serde(flatten)]
    pub resolution: ReferenceResolution,
    pub output_reference_file: PathBuf,
}

impl ResolvedWorkflow {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid resolved workflow {}", path.display()))
    }
}

/// Resolve a run and write `resolved_workflow.json` into `scratch_path`.
pub fn prepare_workflow(config: &RunConfig, scratch_path: &Path) -> Result<ResolvedWorkflow> {
    let frame_key = config.frame_key();

    let stack = EpochStack::from_identifiers(config.input_file_group.cslc_file_list.iter().cloned())
        .context("Invalid input file list")?;
    info!(
        "Frame {}: {} epochs ({} compressed, {} real)",
        frame_key,
        stack.len(),
        stack.compressed_count(),
        stack.real_count()
    );

    let params_file = &config.dynamic_ancillary_file_group.algorithm_parameters_file;
    let mut params = AlgorithmParameters::from_file(params_file)
        .with_context(|| format!("Failed to load {}", params_file.display()))?
        .with_frame_overrides(&frame_key)
        .context("Failed to apply frame overrides")?;

    let reference_dates = load_reference_dates(
        config.static_ancillary_file_group.reference_date_database_json.as_deref(),
        &frame_key,
    )
    .context("Failed to load reference date database")?;
    let resolution = resolve(&stack, &reference_dates, params.phase_linking.compressed_slc_plan);
    info!(
        output_reference_idx = resolution.output_reference_idx,
        extra_reference_date = ?resolution.extra_reference_date,
        plan = %params.phase_linking.compressed_slc_plan,
        "Resolved phase reference from {} requested changeovers",
        reference_dates.len()
    );
    params.phase_linking.output_reference_idx = resolution.output_reference_idx;
    params.output_options.extra_reference_date = resolution.extra_reference_date;

    let output_reference_file = stack
        .get(resolution.output_reference_idx)
        .map(|e| e.identifier().to_path_buf())
        .context("Output reference index outside the stack")?;

    let amplitude_statistics = if stack.has_compressed() {
        let Some(ps) = config.ps_statistics_group.as_ref() else {
            bail!(
                "{} compressed epochs present but no ps_statistics_group configured",
                stack.compressed_count()
            );
        };
        Some(fuse_statistics(&stack, ps, &params, &frame_key)?)
    } else {
        info!(
            "First ministack: lowering amplitude dispersion threshold from {} to {}",
            params.ps_options.amp_dispersion_threshold,
            FIRST_MINISTACK_AMP_DISPERSION_THRESHOLD
        );
        params.ps_options.amp_dispersion_threshold = FIRST_MINISTACK_AMP_DISPERSION_THRESHOLD;
        None
    };

    let workflow = ResolvedWorkflow {
        frame_id: config.input_file_group.frame_id,
        cslc_file_list: stack.epochs().iter().map(|e| e.identifier().to_path_buf()).collect(),
        reference: ResolvedReference {
            resolution,
            output_reference_file,
        },
        amplitude_statistics,
        algorithm_parameters: params,
        scratch_path: scratch_path.to_path_buf(),
        output_directory: config.product_path_group.output_directory.clone(),
    };

    fs::create_dir_all(scratch_path)
        .with_context(|| format!("Failed to create scratch directory {}", scratch_path.display()))?;
    let out = scratch_path.join(RESOLVED_WORKFLOW_NAME);
    fs::write(&out, serde_json::to_string_pretty(&workflow)?)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!("Wrote {}", out.display());

    Ok(workflow)
}

fn fuse_statistics(
    stack: &EpochStack,
    ps: &PsStatisticsGroup,
    params: &AlgorithmParameters,
    frame_key: &str,
) -> Result<FusedStatistics> {
    let compressed = match ps.compressed()? {
        Some(pairs) => {
            if pairs.len() != stack.compressed_count() {
                bail!(
                    "{} compressed amplitude pairs listed for {} compressed epochs",
                    pairs.len(),
                    stack.compressed_count()
                );
            }
            pairs
        }
        None => stack
            .compressed()
            .map(|epoch| sidecar_statistics(epoch.identifier()))
            .collect(),
    };

    let [rows, cols] = params.worker_settings.block_shape;
    let fuser = StatisticsFuser::new(
        info_span!("combine_stats", frame_id = frame_key),
        params.ps_options.weight_scheme,
    )
    .with_block_shape((rows, cols))
    .with_workers(params.worker_settings.n_workers);

    let outcome = fuser
        .fuse(&ps.current(), &compressed, stack.real_count())
        .context("Failed to combine amplitude statistics")?;
    if outcome.was_skipped() {
        warn!("Reusing combined amplitude statistics from a previous run");
    }
    Ok(outcome.into_statistics())
}

/// `<stem>.amp_mean.f32` and `<stem>.amp_dispersion.f32` beside a
/// compressed epoch file
pub fn sidecar_statistics(compressed: &Path) -> StatisticsPair {
    StatisticsPair::new(
        compressed.with_extension("amp_mean.f32"),
        compressed.with_extension("amp_dispersion.f32"),
    )
}
