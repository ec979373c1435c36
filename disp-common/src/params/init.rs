//! Parameter loading, override application and validation

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use super::{merge, AlgorithmParameters};
use crate::catalog::load_overrides;
use crate::{Error, Result};

const OVERRIDES_KEY: &str = "algorithm_parameters_overrides_json";

impl AlgorithmParameters {
    /// Load parameters from a TOML or JSON file (by extension; TOML otherwise).
    ///
    /// A relative overrides path is taken relative to the parameter file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut params = Self::from_tree(Self::load_tree(path)?)?;
        if let (Some(overrides), Some(base)) = (
            params.algorithm_parameters_overrides_json.as_mut(),
            path.parent().filter(|p| !p.as_os_str().is_empty()),
        ) {
            if overrides.is_relative() {
                *overrides = base.join(&*overrides);
            }
        }
        Ok(params)
    }

    /// Read a parameter file into a generic tree without validating it.
    ///
    /// Native TOML dates (`extra_reference_date = 2020-01-01`) become ISO
    /// strings, the same as their quoted form.
    pub fn load_tree(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read parameter file {}: {}", path.display(), e))
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            let value: toml::Value = toml::from_str(&content)?;
            toml_to_json(value)
        }
    }

    /// Deserialize and validate a parameter tree.
    pub fn from_tree(tree: Value) -> Result<Self> {
        let params: AlgorithmParameters = serde_json::from_value(tree)
            .map_err(|e| Error::Config(format!("Invalid algorithm parameters: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Apply the overrides registered for `frame_id`, if any.
    ///
    /// The overrides file reference is consumed: the returned parameters have
    /// no overrides path, so applying twice is harmless.
    pub fn with_frame_overrides(&self, frame_id: &str) -> Result<Self> {
        let overrides =
            load_overrides(self.algorithm_parameters_overrides_json.as_deref(), frame_id)?;

        let mut tree = serde_json::to_value(self)?;
        if let Value::Object(table) = &mut tree {
            table.remove(OVERRIDES_KEY);
        }

        if overrides.is_empty() {
            debug!(frame_id, "No parameter overrides for frame");
        } else {
            let keys: Vec<&str> = overrides.keys().map(String::as_str).collect();
            info!(frame_id, ?keys, "Applying frame-specific parameter overrides");
        }

        Self::from_tree(merge(&tree, &overrides))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.ps_options.amp_dispersion_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::Config(format!(
                "ps_options.amp_dispersion_threshold: value {} out of range (0.0, 1.0]",
                threshold
            )));
        }
        if self.phase_linking.ministack_size < 2 {
            return Err(Error::Config(format!(
                "phase_linking.ministack_size: value {} must be at least 2",
                self.phase_linking.ministack_size
            )));
        }
        for (name, value) in [
            (
                "recommended_temporal_coherence_threshold",
                self.recommended_temporal_coherence_threshold,
            ),
            (
                "recommended_similarity_threshold",
                self.recommended_similarity_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{}: value {} out of range [0.0, 1.0]",
                    name, value
                )));
            }
        }
        let [rows, cols] = self.worker_settings.block_shape;
        if rows == 0 || cols == 0 {
            return Err(Error::Config(format!(
                "worker_settings.block_shape: [{}, {}] must be positive",
                rows, cols
            )));
        }
        if self.worker_settings.n_workers == 0 {
            return Err(Error::Config(
                "worker_settings.n_workers: must be at least 1".to_string(),
            ));
        }
        if self.num_parallel_products == 0 {
            return Err(Error::Config(
                "num_parallel_products: must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn toml_to_json(value: toml::Value) -> Result<Value> {
    Ok(match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| Error::Config(format!("Non-finite number {} in parameter file", f)))?,
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(toml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| Ok((k, toml_to_json(v)?)))
                .collect::<Result<serde_json::Map<_, _>>>()?,
        ),
    })
}
