use serde::Serialize;

use crate::cost::{CostReport, PerTarget, TargetVector, WeightVector};
use crate::enums::{SortBy, TargetKey};
use crate::optimizer::{Objective, OptimizationOutcome};
use crate::planner::{Plan, PlanError};

/// Parameters the plan was built with, in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanParams {
    pub window_coverage: f64,
    pub step_size: f64,
}

/// Everything needed to reproduce and judge a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub params: PlanParams,
    pub cost: f64,
    pub sort_by: SortBy,
    pub windows: Plan,
    pub stats: PerTarget<f64>,
    pub errors: PerTarget<f64>,
    pub costs: PerTarget<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub guarded: Vec<TargetKey>,
    pub targets: TargetVector,
    pub weights: WeightVector,
}

impl PlanReport {
    /// Re-plan with `params` and collect the plan with its cost breakdown
    pub fn build(objective: &Objective<'_>, params: PlanParams) -> Result<Self, PlanError> {
        let (plan, report) = objective.report(params.window_coverage, params.step_size)?;
        Ok(Self::from_parts(params, plan, report, objective))
    }

    /// Report for the best parameters of an optimization
    pub fn from_outcome(
        objective: &Objective<'_>,
        outcome: &OptimizationOutcome,
    ) -> Result<Self, PlanError> {
        let [window_coverage, step_size] = outcome.best_params;
        let params = PlanParams {
            window_coverage,
            step_size,
        };
        Self::build(objective, params)
    }

    fn from_parts(
        params: PlanParams,
        plan: Plan,
        report: CostReport,
        objective: &Objective<'_>,
    ) -> Self {
        let CostReport {
            stats,
            errors,
            costs,
            sum,
            guarded,
        } = report;

        Self {
            params,
            cost: sum,
            sort_by: SortBy::ScanAxis,
            windows: plan,
            stats,
            errors,
            costs,
            guarded,
            targets: *objective.targets(),
            weights: *objective.weights(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
