//! # DICOM window planner
//!
//! This crate plans overlapping windows over a stack of DICOM slices.
//!
//! Slices are ordered along the scan axis, the normal of the imaging plane
//! derived from ImageOrientationPatient, and measured by projecting
//! ImagePositionPatient onto it. A greedy planner then cuts the stack into
//! windows of a requested physical coverage, each starting a requested
//! distance after the previous one. Because slices are discrete and their
//! thickness may vary, the requested values are rarely hit exactly; a
//! multi-start Nelder-Mead search tunes the window coverage and step size so
//! the achieved total coverage, mean window coverage and mean step come
//! closest to the targets under a weighted relative-error cost.
//!
//! Slice headers can be read from DICOM files with [`SliceLoader`], which
//! skips pixel data and reads files in parallel using rayon. Any other source
//! can build [`SliceRecord`]s directly. DICOM files are assumed to have the
//! following attributes:
//!  - ImageOrientationPatient and ImagePositionPatient on every slice
//!    (otherwise only a metadata order is available)
//!  - SliceThickness on at least one slice
//!  - Images from the same series (Series Instance UID)
//!
//! # Examples
//!
//! ## Planning a series directory
//!
//! ```no_run
//! # use dicom_window_planner::*;
//! let records = SliceLoader::load_from_directory("dicom")
//!     .expect("should have loaded slice headers from directory");
//! let table = SliceGeometryResolver::resolve(&records)
//!     .and_then(Resolution::into_positions)
//!     .expect("should have resolved slice positions");
//!
//! let targets = TargetVector::spanning(&table, 150.0, 60.0);
//! let weights = WeightVector::normalize(PerTarget::new(0.5, 0.3, 0.2));
//! let objective = Objective::new(&table, targets, weights, WindowPlanner::default());
//!
//! let outcome = Optimizer::new(objective.clone(), OptimizerConfig::default())
//!     .optimize([150.0, 60.0]);
//! let report = PlanReport::from_outcome(&objective, &outcome)
//!     .expect("best parameters should plan");
//! println!("{}", report.to_json().expect("report serializes"));
//! ```

use thiserror::Error;

pub mod config;
pub mod cost;
pub mod diagnostics;
pub mod enums;
pub mod geometry;
pub mod optimizer;
pub mod planner;
pub mod report;
pub mod simplex;
pub mod slice;
pub mod slice_loader;

pub use config::{ConfigError, RunConfig, load_config};
pub use cost::{CostModel, CostReport, PerTarget, TargetVector, WeightVector};
pub use diagnostics::{CostGrid, RunDiagnostics};
pub use enums::{SliceKey, SortBy, TargetKey};
pub use geometry::{GeometryError, Position, PositionTable, Resolution, SliceGeometryResolver};
pub use optimizer::{Evaluation, Objective, OptimizationOutcome, Optimizer, OptimizerConfig};
pub use planner::{Plan, PlanError, PlannerConfig, WindowPlanner};
pub use report::{PlanParams, PlanReport};
pub use slice::SliceRecord;
pub use slice_loader::{SliceLoader, SliceLoaderError};

/// Any failure that stops a planning run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] SliceLoaderError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
