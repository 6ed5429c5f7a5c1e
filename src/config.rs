use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::cost::{PerTarget, TargetVector, WeightVector};
use crate::geometry::PositionTable;
use crate::optimizer::OptimizerConfig;
use crate::planner::PlannerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Desired plan geometry in mm.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TargetConfig {
    pub window_coverage: f64,
    pub step_size: f64,
    /// Whole stack, first slice to last, when absent.
    #[serde(default)]
    pub total_coverage: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Plan report destination; stdout when absent.
    pub json_out: Option<PathBuf>,
    pub diagnostics_out: Option<PathBuf>,
    /// Cost grid resolution per axis; no grid when 0.
    pub grid_size: usize,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RunConfig {
    pub series_dir: PathBuf,
    pub targets: TargetConfig,
    #[serde(default = "default_weights")]
    pub weights: PerTarget<f64>,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_weights() -> PerTarget<f64> {
    PerTarget::new(0.5, 0.3, 0.2)
}

impl RunConfig {
    pub fn target_vector(&self, table: &PositionTable) -> TargetVector {
        let mut targets =
            TargetVector::spanning(table, self.targets.window_coverage, self.targets.step_size);
        if let Some(total_coverage) = self.targets.total_coverage {
            targets.total_coverage = total_coverage;
        }
        targets
    }

    pub fn weight_vector(&self) -> WeightVector {
        WeightVector::normalize(self.weights)
    }

    /// Start of the nominal optimizer run: the requested window coverage and step.
    pub fn nominal_params(&self) -> [f64; 2] {
        [self.targets.window_coverage, self.targets.step_size]
    }
}

pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "series_dir": "W:/L067_FD_1_0_B30F_0001",
                "targets": { "window_coverage": 150, "step_size": 60 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.weights, PerTarget::new(0.5, 0.3, 0.2));
        assert_eq!(config.optimizer, OptimizerConfig::default());
        assert_eq!(config.planner, PlannerConfig::default());
        assert_eq!(config.output, OutputConfig::default());
        assert_eq!(config.targets.total_coverage, None);
        assert_eq!(config.nominal_params(), [150.0, 60.0]);
    }

    #[test]
    fn nested_sections_override_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "series_dir": "series",
                "targets": { "window_coverage": 40, "step_size": 20, "total_coverage": 300 },
                "weights": { "total_coverage": 0, "window_coverage": 0, "step_size": 0 },
                "optimizer": { "restarts": 3, "seed": 42, "perturbation": [0.8, 1.2] },
                "planner": { "coverage_tolerance_pct": 2.5 },
                "output": { "json_out": "plan.json", "grid_size": 50 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.optimizer.restarts, 3);
        assert_eq!(config.optimizer.seed, Some(42));
        assert_eq!(config.optimizer.perturbation, (0.8, 1.2));
        assert_eq!(config.optimizer.max_iterations, 2000);
        assert_eq!(config.planner.coverage_tolerance_pct, 2.5);
        assert_eq!(config.output.grid_size, 50);
        assert_eq!(config.weight_vector(), WeightVector::uniform());

        let table = PositionTable::default();
        assert_eq!(config.target_vector(&table).total_coverage, 300.0);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/run.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/run.json"));
    }
}
