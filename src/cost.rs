use log::debug;
use serde::{Deserialize, Serialize};

use crate::enums::TargetKey;
use crate::geometry::PositionTable;
use crate::planner::{Plan, error_pct};

/// Error term used when relative error is undefined (zero or non-finite
/// target, or a statistic that could not be computed).
pub const GUARDED_ERROR_PCT: f64 = 1e12;

/// One value per scored quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerTarget<T> {
    pub total_coverage: T,
    pub window_coverage: T,
    pub step_size: T,
}

impl<T: Copy> PerTarget<T> {
    pub fn new(total_coverage: T, window_coverage: T, step_size: T) -> Self {
        Self {
            total_coverage,
            window_coverage,
            step_size,
        }
    }

    pub fn splat(value: T) -> Self {
        Self::new(value, value, value)
    }

    pub fn get(&self, key: TargetKey) -> T {
        match key {
            TargetKey::TotalCoverage => self.total_coverage,
            TargetKey::WindowCoverage => self.window_coverage,
            TargetKey::StepSize => self.step_size,
        }
    }

    pub fn map<U: Copy>(&self, mut f: impl FnMut(TargetKey, T) -> U) -> PerTarget<U> {
        PerTarget::new(
            f(TargetKey::TotalCoverage, self.total_coverage),
            f(TargetKey::WindowCoverage, self.window_coverage),
            f(TargetKey::StepSize, self.step_size),
        )
    }
}

impl PerTarget<f64> {
    pub fn sum(&self) -> f64 {
        self.total_coverage + self.window_coverage + self.step_size
    }
}

/// Desired total coverage, window coverage and step size, in mm.
pub type TargetVector = PerTarget<f64>;

impl TargetVector {
    /// Targets whose total coverage is the whole stack, first slice to last.
    pub fn spanning(table: &PositionTable, window_coverage: f64, step_size: f64) -> Self {
        let total_coverage = match (table.first(), table.last()) {
            (Some(first), Some(last)) if table.len() > 1 => first.coverage_to(last),
            (Some(first), _) => first.coverage(),
            _ => 0.0,
        };
        Self::new(total_coverage, window_coverage, step_size)
    }
}

/// Cost weights, normalized to sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeightVector(PerTarget<f64>);

impl WeightVector {
    /// Scale raw weights to sum to one; all-zero weights become uniform.
    pub fn normalize(raw: PerTarget<f64>) -> Self {
        let total = raw.sum();
        if total == 0.0 || !total.is_finite() {
            return Self::uniform();
        }
        Self(raw.map(|_, weight| weight / total))
    }

    pub fn uniform() -> Self {
        Self(PerTarget::splat(1.0 / TargetKey::ALL.len() as f64))
    }

    pub fn get(&self, key: TargetKey) -> f64 {
        self.0.get(key)
    }

    pub fn values(&self) -> &PerTarget<f64> {
        &self.0
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Achieved statistics of a plan and their weighted deviation from targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub stats: PerTarget<f64>,
    pub errors: PerTarget<f64>,
    pub costs: PerTarget<f64>,
    pub sum: f64,
    /// Terms whose error was replaced by [`GUARDED_ERROR_PCT`].
    pub guarded: Vec<TargetKey>,
}

pub struct CostModel;

impl CostModel {
    /// Plan statistics: full-span coverage, mean window coverage, mean step
    ///
    /// Statistics that cannot be computed (empty plan, unknown keys) are NaN.
    pub fn stats(plan: &Plan, table: &PositionTable) -> PerTarget<f64> {
        let total_coverage = match (plan.windows().next(), plan.windows().last()) {
            (Some(first), Some(last)) => table
                .get(&first.start)
                .zip(table.get(&last.end))
                .map_or(f64::NAN, |(start, end)| start.coverage_to(end)),
            _ => f64::NAN,
        };

        let count = plan.len() as f64;
        let window_coverage = plan.windows().map(|w| w.coverage).sum::<f64>() / count;
        let step_size = plan.steps().map(|s| s.distance).sum::<f64>() / count;

        PerTarget::new(total_coverage, window_coverage, step_size)
    }

    pub fn evaluate(
        plan: &Plan,
        table: &PositionTable,
        targets: &TargetVector,
        weights: &WeightVector,
    ) -> CostReport {
        Self::score(Self::stats(plan, table), targets, weights)
    }

    /// Weighted relative error of `stats` against `targets`
    pub fn score(stats: PerTarget<f64>, targets: &TargetVector, weights: &WeightVector) -> CostReport {
        let mut guarded = Vec::new();
        let errors = stats.map(|key, stat| {
            let target = targets.get(key);
            if target == 0.0 || !target.is_finite() || !stat.is_finite() {
                debug!("{key}: relative error undefined (stat {stat}, target {target})");
                guarded.push(key);
                GUARDED_ERROR_PCT
            } else {
                error_pct(stat, target)
            }
        });
        let costs = errors.map(|key, error| weights.get(key) * error);

        CostReport {
            stats,
            errors,
            costs,
            sum: costs.sum(),
            guarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::SliceKey;
    use crate::geometry::Position;
    use crate::planner::WindowPlanner;

    fn uniform_table(count: usize) -> PositionTable {
        PositionTable::new(
            (0..count)
                .map(|i| Position {
                    key: SliceKey::Instance(i as i32 + 1),
                    rel_center: i as f64,
                    thickness: 1.0,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn weights_normalize_to_one() {
        let weights = WeightVector::normalize(PerTarget::new(0.5, 0.3, 0.2));
        assert!((weights.values().sum() - 1.0).abs() < 1e-12);
        assert!((weights.get(TargetKey::TotalCoverage) - 0.5).abs() < 1e-12);

        let weights = WeightVector::normalize(PerTarget::new(2.0, 1.0, 1.0));
        assert!((weights.values().sum() - 1.0).abs() < 1e-12);
        assert_eq!(weights.get(TargetKey::StepSize), 0.25);
    }

    #[test]
    fn zero_weights_become_uniform() {
        let weights = WeightVector::normalize(PerTarget::splat(0.0));
        for key in TargetKey::ALL {
            assert_eq!(weights.get(key), 1.0 / 3.0);
        }
    }

    #[test]
    fn spanning_targets_cover_the_whole_stack() {
        let targets = TargetVector::spanning(&uniform_table(30), 10.0, 5.0);
        assert_eq!(targets, PerTarget::new(30.0, 10.0, 5.0));
    }

    #[test]
    fn stats_follow_plan() {
        let table = uniform_table(30);
        let plan = WindowPlanner::default().plan(&table, 10.0, 5.0).unwrap();
        let stats = CostModel::stats(&plan, &table);
        // windows start at 0, 5, .., 20; the last one ends at 29
        assert_eq!(stats, PerTarget::new(30.0, 10.0, 5.0));
    }

    #[test]
    fn exact_stats_cost_nothing() {
        let table = uniform_table(30);
        let plan = WindowPlanner::default().plan(&table, 10.0, 5.0).unwrap();
        let targets = TargetVector::spanning(&table, 10.0, 5.0);
        let report = CostModel::evaluate(&plan, &table, &targets, &WeightVector::default());
        assert_eq!(report.sum, 0.0);
        assert!(report.guarded.is_empty());
    }

    #[test]
    fn costs_are_weighted_errors() {
        let report = CostModel::score(
            PerTarget::new(110.0, 15.0, 8.0),
            &PerTarget::new(100.0, 10.0, 10.0),
            &WeightVector::normalize(PerTarget::new(0.5, 0.3, 0.2)),
        );
        let expected = PerTarget::new(10.0, 50.0, 20.0);
        for key in TargetKey::ALL {
            assert!((report.errors.get(key) - expected.get(key)).abs() < 1e-9);
        }
        assert!((report.sum - (0.5 * 10.0 + 0.3 * 50.0 + 0.2 * 20.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_targets_are_guarded() {
        let report = CostModel::score(
            PerTarget::new(30.0, 10.0, 5.0),
            &PerTarget::splat(0.0),
            &WeightVector::default(),
        );
        assert_eq!(report.errors, PerTarget::splat(GUARDED_ERROR_PCT));
        assert_eq!(report.guarded, TargetKey::ALL.to_vec());
        assert!(report.sum.is_finite());
    }

    #[test]
    fn empty_plan_is_guarded() {
        let table = uniform_table(3);
        let report = CostModel::evaluate(
            &Plan::default(),
            &table,
            &PerTarget::new(3.0, 2.0, 1.0),
            &WeightVector::default(),
        );
        assert_eq!(report.guarded.len(), 3);
        assert!(report.sum.is_finite());
    }
}
