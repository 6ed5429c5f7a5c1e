//! Multi-start tuning of window coverage and step size.
//!
//! The objective plans a stack with candidate parameters and scores the plan
//! against the targets. Planning failures and non-finite scores become a
//! fixed penalty, so every point of the parameter plane has a comparable
//! value. Each run is independent: restart points are drawn up front and runs
//! share nothing but the immutable position table, so they may run on the
//! rayon pool without changing the result.

use log::{debug, info};
use ndarray::{Array1, array};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::Instant;

use crate::cost::{CostModel, CostReport, TargetVector, WeightVector};
use crate::geometry::PositionTable;
use crate::planner::{Plan, PlanError, WindowPlanner};
use crate::simplex::{self, IterationRecord, SimplexOptions};

/// Objective value for parameters that cannot be planned or scored.
pub const PENALTY: f64 = 1e12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PenaltyReason {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("cost is not finite: {0}")]
    NonFinite(f64),
}

/// Guarded objective value.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Value(f64),
    Penalty(PenaltyReason),
}

impl Evaluation {
    /// Total order value used by the search.
    pub fn score(&self) -> f64 {
        match self {
            Evaluation::Value(value) => *value,
            Evaluation::Penalty(_) => PENALTY,
        }
    }

    pub fn is_penalty(&self) -> bool {
        matches!(self, Evaluation::Penalty(_))
    }
}

/// Plans a fixed stack against fixed targets and weights.
#[derive(Debug, Clone)]
pub struct Objective<'a> {
    table: &'a PositionTable,
    targets: TargetVector,
    weights: WeightVector,
    planner: WindowPlanner,
}

impl<'a> Objective<'a> {
    pub fn new(
        table: &'a PositionTable,
        targets: TargetVector,
        weights: WeightVector,
        planner: WindowPlanner,
    ) -> Self {
        Self {
            table,
            targets,
            weights,
            planner,
        }
    }

    pub fn table(&self) -> &PositionTable {
        self.table
    }

    pub fn targets(&self) -> &TargetVector {
        &self.targets
    }

    pub fn weights(&self) -> &WeightVector {
        &self.weights
    }

    /// Plan with the given parameters and score the plan
    pub fn report(&self, window_coverage: f64, step_size: f64) -> Result<(Plan, CostReport), PlanError> {
        let plan = self.planner.plan(self.table, window_coverage, step_size)?;
        let report = CostModel::evaluate(&plan, self.table, &self.targets, &self.weights);
        Ok((plan, report))
    }

    pub fn evaluate(&self, window_coverage: f64, step_size: f64) -> Evaluation {
        let evaluation = match self.report(window_coverage, step_size) {
            Ok((_, report)) if report.sum.is_finite() => Evaluation::Value(report.sum),
            Ok((_, report)) => Evaluation::Penalty(PenaltyReason::NonFinite(report.sum)),
            Err(err) => Evaluation::Penalty(err.into()),
        };
        if let Evaluation::Penalty(reason) = &evaluation {
            debug!("penalized ({window_coverage:.4}, {step_size:.4}): {reason}");
        }
        evaluation
    }

    /// Guarded value for a parameter vector `[window_coverage, step_size]`.
    pub fn score(&self, params: &[f64]) -> f64 {
        match params {
            [window_coverage, step_size] => self.evaluate(*window_coverage, *step_size).score(),
            _ => PENALTY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Total runs, the nominal-start run included.
    pub restarts: usize,
    pub max_iterations: usize,
    pub xatol: f64,
    pub fatol: f64,
    /// Range of the per-coordinate factor applied to the nominal start.
    pub perturbation: (f64, f64),
    /// Seed for restart points; entropy when absent.
    pub seed: Option<u64>,
    pub parallel: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            restarts: 10,
            max_iterations: 2000,
            xatol: 1e-4,
            fatol: 1e-4,
            perturbation: (0.5, 1.5),
            seed: None,
            parallel: true,
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts.max(1);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerances(mut self, xatol: f64, fatol: f64) -> Self {
        self.xatol = xatol;
        self.fatol = fatol;
        self
    }

    pub fn with_perturbation(mut self, low: f64, high: f64) -> Self {
        self.perturbation = (low, high);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn simplex_options(&self) -> SimplexOptions {
        SimplexOptions {
            max_iterations: self.max_iterations,
            xatol: self.xatol,
            fatol: self.fatol,
        }
    }
}

/// Trajectory and outcome of one direct-search run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTrace {
    pub run: usize,
    pub start: Vec<f64>,
    pub history: Vec<IterationRecord>,
    pub best_params: Vec<f64>,
    pub best_cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationOutcome {
    /// `[window_coverage, step_size]` of the best run.
    pub best_params: [f64; 2],
    pub best_cost: f64,
    pub best_run: usize,
    pub runs: Vec<RunTrace>,
}

pub struct Optimizer<'a> {
    objective: Objective<'a>,
    config: OptimizerConfig,
}

impl<'a> Optimizer<'a> {
    pub fn new(objective: Objective<'a>, config: OptimizerConfig) -> Self {
        Self { objective, config }
    }

    pub fn objective(&self) -> &Objective<'a> {
        &self.objective
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Start points: `nominal` first, then perturbed copies of it
    pub fn start_points(&self, nominal: [f64; 2]) -> Vec<Array1<f64>> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (low, high) = self.config.perturbation;
        let nominal = array![nominal[0], nominal[1]];

        let mut starts = vec![nominal.clone()];
        for _ in 1..self.config.restarts.max(1) {
            starts.push(nominal.mapv(|v| {
                let factor = if low < high { rng.gen_range(low..high) } else { low };
                v * factor
            }));
        }
        starts
    }

    /// Run the direct search from the nominal start and every restart point
    ///
    /// The returned best cost never exceeds the nominal run's best cost; ties
    /// go to the earliest run.
    pub fn optimize(&self, nominal: [f64; 2]) -> OptimizationOutcome {
        let started = Instant::now();
        let starts = self.start_points(nominal);

        let runs: Vec<RunTrace> = if self.config.parallel {
            starts
                .par_iter()
                .enumerate()
                .map(|(run, start)| self.run(run, start))
                .collect()
        } else {
            starts
                .iter()
                .enumerate()
                .map(|(run, start)| self.run(run, start))
                .collect()
        };

        let mut best_run = 0;
        for (i, trace) in runs.iter().enumerate().skip(1) {
            if trace.best_cost < runs[best_run].best_cost {
                best_run = i;
            }
        }

        let best = &runs[best_run];
        info!(
            "best of {} runs: run {} at [{:.4}, {:.4}] with cost {:.6} ({:.1} ms)",
            runs.len(),
            best_run,
            best.best_params[0],
            best.best_params[1],
            best.best_cost,
            started.elapsed().as_secs_f64() * 1e3
        );

        OptimizationOutcome {
            best_params: [best.best_params[0], best.best_params[1]],
            best_cost: best.best_cost,
            best_run,
            runs,
        }
    }

    fn run(&self, run: usize, start: &Array1<f64>) -> RunTrace {
        let started = Instant::now();
        let result = simplex::minimize(
            |x| self.objective.score(x.as_slice().unwrap_or(&[])),
            start,
            &self.config.simplex_options(),
        );
        let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;

        debug!(
            "run {run}: start {start} -> {} cost {:.6} after {} iterations (converged: {})",
            result.best, result.value, result.iterations, result.converged
        );

        RunTrace {
            run,
            start: start.to_vec(),
            history: result.history,
            best_params: result.best.to_vec(),
            best_cost: result.value,
            iterations: result.iterations,
            evaluations: result.evaluations,
            converged: result.converged,
            elapsed_ms,
        }
    }
}
