use log::debug;
use ndarray::{Array1, Array2, Zip};
use serde::{Serialize, Serializer, ser::SerializeSeq};

use crate::optimizer::{Objective, OptimizationOutcome, RunTrace};

/// Objective values over a window-coverage × step-size grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostGrid {
    pub window_coverage: Vec<f64>,
    pub step_size: Vec<f64>,
    /// Row `i` holds `step_size[i]`, column `j` holds `window_coverage[j]`.
    #[serde(serialize_with = "serialize_rows")]
    pub costs: Array2<f64>,
}

impl CostGrid {
    /// Evaluate the guarded objective at every grid point in parallel
    pub fn sweep(objective: &Objective<'_>, window_coverage: Vec<f64>, step_size: Vec<f64>) -> Self {
        let mut costs = Array2::<f64>::zeros((step_size.len(), window_coverage.len()));
        Zip::indexed(&mut costs).par_for_each(|(i, j), cost| {
            *cost = objective.score(&[window_coverage[j], step_size[i]]);
        });

        debug!(
            "evaluated {}x{} cost grid",
            step_size.len(),
            window_coverage.len()
        );

        Self {
            window_coverage,
            step_size,
            costs,
        }
    }

    /// Grid over the box visited by `runs`, widened by 10% on each side
    ///
    /// The box spans every run's start point and its per-iteration best
    /// points. The lower bound of each axis is at least 1 mm. Returns `None` when the
    /// runs visited no points.
    pub fn around_runs(objective: &Objective<'_>, runs: &[RunTrace], size: usize) -> Option<Self> {
        let points: Vec<&[f64]> = runs
            .iter()
            .flat_map(|run| {
                let visited = run.history.iter().map(|record| record.params.as_slice());
                std::iter::once(run.start.as_slice()).chain(visited)
            })
            .filter(|params| params.len() == 2)
            .collect();
        if points.is_empty() {
            return None;
        }

        let axis = |d: usize| {
            let (min, max) = points
                .iter()
                .map(|p| p[d])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            let low = (min * 0.9).max(1.0);
            let high = (max * 1.1).max(low);
            Array1::linspace(low, high, size.max(2)).to_vec()
        };

        Some(Self::sweep(objective, axis(0), axis(1)))
    }

    /// Grid point with the lowest cost as `(window_coverage, step_size, cost)`
    pub fn minimum(&self) -> Option<(f64, f64, f64)> {
        self.costs
            .indexed_iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|((i, j), &cost)| (self.window_coverage[j], self.step_size[i], cost))
    }
}

fn serialize_rows<S: Serializer>(costs: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(costs.nrows()))?;
    for row in costs.rows() {
        seq.serialize_element(&row.to_vec())?;
    }
    seq.end()
}

/// Per-run optimizer trajectories, for external convergence plots.
#[derive(Debug, Clone, Serialize)]
pub struct RunDiagnostics<'a> {
    pub best_run: usize,
    pub runs: &'a [RunTrace],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<CostGrid>,
}

impl<'a> RunDiagnostics<'a> {
    pub fn new(outcome: &'a OptimizationOutcome) -> Self {
        Self {
            best_run: outcome.best_run,
            runs: &outcome.runs,
            grid: None,
        }
    }

    pub fn with_grid(mut self, grid: CostGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
