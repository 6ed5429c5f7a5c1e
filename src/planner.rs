//! Greedy window planning along the scan axis.
//!
//! Starting at the smallest key, every window end and every step is picked
//! by a nearest-match search over all larger keys. Coverage is not linear
//! in the slice index once thickness varies, so the search is a full scan
//! rather than an offset lookup.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::SliceKey;
use crate::geometry::{Position, PositionTable};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("No slice follows {start} to end a window or step on")]
    NoCandidate { start: SliceKey },

    #[error("Target {name} must be positive and finite, got {value}")]
    InvalidTarget { name: &'static str, value: f64 },

    #[error("No positions to plan over")]
    EmptyTable,

    #[error("Start index {0} is outside the position table")]
    StartOutOfRange(usize),
}

impl Position {
    /// Centre-to-centre distance along the scan axis.
    pub fn distance_to(&self, other: &Position) -> f64 {
        (other.rel_center - self.rel_center).abs()
    }

    /// Mean thickness of two boundary slices.
    pub fn span_thickness(&self, other: &Position) -> f64 {
        (self.thickness + other.thickness) / 2.0
    }

    /// Length spanned from `self` to `other`, including half of each boundary slice.
    pub fn coverage_to(&self, other: &Position) -> f64 {
        self.distance_to(other) + self.span_thickness(other)
    }

    /// Length covered by this slice alone.
    pub fn coverage(&self) -> f64 {
        self.thickness
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// A candidate window with a larger coverage error ends the plan.
    pub coverage_tolerance_pct: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            coverage_tolerance_pct: 1.0,
        }
    }
}

impl PlannerConfig {
    pub fn with_coverage_tolerance_pct(mut self, tolerance: f64) -> Self {
        self.coverage_tolerance_pct = tolerance;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    pub start: SliceKey,
    pub end: SliceKey,
    /// Achieved coverage in mm.
    pub coverage: f64,
    pub error_pct: f64,
    /// Slices from `start` to `end` inclusive.
    pub slice_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub from: SliceKey,
    pub to: SliceKey,
    /// Achieved distance in mm.
    pub distance: f64,
    pub error_pct: f64,
    /// Slices from `from` to `to` inclusive.
    pub slice_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub window: Window,
    pub step: Step,
}

/// Ordered windows and the steps that lead from each window start to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn windows(&self) -> impl Iterator<Item = &Window> {
        self.entries.iter().map(|entry| &entry.window)
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.entries.iter().map(|entry| &entry.step)
    }
}

impl FromIterator<PlanEntry> for Plan {
    fn from_iter<I: IntoIterator<Item = PlanEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Result of a nearest-match search.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Match {
    index: usize,
    value: f64,
    error_pct: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowPlanner {
    config: PlannerConfig,
}

impl WindowPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan windows of `window_coverage` mm, `step_size` mm apart
    ///
    /// The first window is always kept. Each later window is kept only while
    /// its coverage error stays within the configured tolerance; the first
    /// window beyond it ends the plan. Steps are not held to the tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::NoCandidate`] when a window or step would have to
    /// start at the last slice, and [`PlanError::InvalidTarget`] for
    /// non-positive targets
    pub fn plan(
        &self,
        table: &PositionTable,
        window_coverage: f64,
        step_size: f64,
    ) -> Result<Plan, PlanError> {
        check_target("window_coverage", window_coverage)?;
        check_target("step_size", step_size)?;
        if table.is_empty() {
            return Err(PlanError::EmptyTable);
        }

        let mut entries = Vec::new();
        let mut start = 0;
        let mut window = self.window_from(table, start, window_coverage)?;

        loop {
            let step = self.step_from(table, start, step_size)?;
            start += step.slice_count - 1;
            entries.push(PlanEntry { window, step });

            window = self.window_from(table, start, window_coverage)?;
            if window.error_pct > self.config.coverage_tolerance_pct {
                debug!(
                    "plan ends before {} with coverage error {:.3}%",
                    window.start, window.error_pct
                );
                break;
            }
        }

        Ok(Plan { entries })
    }

    /// Window starting at table index `start` whose coverage is closest to `target`
    pub fn window_from(
        &self,
        table: &PositionTable,
        start: usize,
        target: f64,
    ) -> Result<Window, PlanError> {
        let found = nearest_match(table, start, target, Position::coverage_to)?;
        let positions = table.as_slice();
        Ok(Window {
            start: positions[start].key.clone(),
            end: positions[found.index].key.clone(),
            coverage: found.value,
            error_pct: found.error_pct,
            slice_count: found.index - start + 1,
        })
    }

    /// Step from table index `start` whose distance is closest to `target`
    pub fn step_from(
        &self,
        table: &PositionTable,
        start: usize,
        target: f64,
    ) -> Result<Step, PlanError> {
        let found = nearest_match(table, start, target, Position::distance_to)?;
        let positions = table.as_slice();
        Ok(Step {
            from: positions[start].key.clone(),
            to: positions[found.index].key.clone(),
            distance: found.value,
            error_pct: found.error_pct,
            slice_count: found.index - start + 1,
        })
    }
}

fn check_target(name: &'static str, value: f64) -> Result<(), PlanError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PlanError::InvalidTarget { name, value })
    }
}

/// Relative deviation from `target` in percent.
pub(crate) fn error_pct(value: f64, target: f64) -> f64 {
    (value - target).abs() / target * 100.0
}

/// Scan every key after `start`; ties keep the smallest key.
fn nearest_match(
    table: &PositionTable,
    start: usize,
    target: f64,
    measure: impl Fn(&Position, &Position) -> f64,
) -> Result<Match, PlanError> {
    let positions = table.as_slice();
    let origin = positions
        .get(start)
        .ok_or(PlanError::StartOutOfRange(start))?;

    let mut best: Option<Match> = None;
    for (index, candidate) in positions.iter().enumerate().skip(start + 1) {
        let value = measure(origin, candidate);
        let error_pct = error_pct(value, target);
        if best.is_none_or(|b| error_pct < b.error_pct) {
            best = Some(Match {
                index,
                value,
                error_pct,
            });
        }
    }

    best.ok_or_else(|| PlanError::NoCandidate {
        start: origin.key.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(centers: &[f64], thickness: &[f64]) -> PositionTable {
        let positions = centers
            .iter()
            .zip(thickness)
            .enumerate()
            .map(|(i, (&rel_center, &thickness))| Position {
                key: SliceKey::Instance(i as i32 + 1),
                rel_center,
                thickness,
            })
            .collect();
        PositionTable::new(positions).unwrap()
    }

    fn uniform(count: usize, spacing: f64, thickness: f64) -> PositionTable {
        let centers: Vec<_> = (0..count).map(|i| i as f64 * spacing).collect();
        table(&centers, &vec![thickness; count])
    }

    #[test]
    fn primitives_follow_centre_and_thickness() {
        let a = Position {
            key: SliceKey::Instance(1),
            rel_center: 2.0,
            thickness: 1.0,
        };
        let b = Position {
            key: SliceKey::Instance(2),
            rel_center: 8.0,
            thickness: 3.0,
        };
        assert_eq!(a.distance_to(&b), 6.0);
        assert_eq!(b.distance_to(&a), 6.0);
        assert_eq!(a.span_thickness(&b), 2.0);
        assert_eq!(a.coverage_to(&b), 8.0);
        assert_eq!(a.coverage(), 1.0);
        assert!(a.coverage_to(&b) >= a.distance_to(&b));
    }

    #[test]
    fn first_window_and_step_hit_exact_targets() {
        let table = table(&[0.0, 5.0, 10.0, 15.0, 20.0], &[5.0; 5]);
        let planner = WindowPlanner::default();

        let window = planner.window_from(&table, 0, 15.0).unwrap();
        assert_eq!(window.start, SliceKey::Instance(1));
        assert_eq!(window.end, SliceKey::Instance(3));
        assert_eq!(window.coverage, 15.0);
        assert_eq!(window.error_pct, 0.0);
        assert_eq!(window.slice_count, 3);

        let step = planner.step_from(&table, 0, 10.0).unwrap();
        assert_eq!(step.to, SliceKey::Instance(3));
        assert_eq!(step.distance, 10.0);
        assert_eq!(step.error_pct, 0.0);
    }

    #[test]
    fn search_is_global_not_offset_based() {
        // Thick slice 4 makes coverage to it jump past coverage to slice 5.
        let table = table(&[0.0, 1.0, 2.0, 3.0, 3.5], &[1.0, 1.0, 1.0, 7.0, 1.0]);
        let window = WindowPlanner::default().window_from(&table, 0, 4.5).unwrap();
        assert_eq!(window.end, SliceKey::Instance(5));
        assert_eq!(window.coverage, 4.5);
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        // distances 4 and 6 are both 1 mm off a 5 mm target
        let table = table(&[0.0, 4.0, 6.0], &[1.0; 3]);
        let step = WindowPlanner::default().step_from(&table, 0, 5.0).unwrap();
        assert_eq!(step.to, SliceKey::Instance(2));
    }

    #[test]
    fn plan_stops_when_next_window_exceeds_tolerance() {
        let table = uniform(30, 1.0, 1.0);
        let plan = WindowPlanner::default().plan(&table, 10.0, 5.0).unwrap();

        let starts: Vec<_> = plan.windows().map(|w| w.start.clone()).collect();
        assert_eq!(starts, [1, 6, 11, 16, 21].map(SliceKey::Instance).to_vec());
        for entry in plan.entries() {
            assert_eq!(entry.window.coverage, 10.0);
            assert_eq!(entry.step.distance, 5.0);
        }
    }

    #[test]
    fn windows_always_end_after_their_start() {
        let table = table(
            &[0.0, 0.7, 2.1, 2.2, 4.0, 5.5, 5.9, 7.3, 9.0, 9.2, 11.0, 12.5, 13.0, 14.9],
            &[0.5, 1.0, 0.8, 1.2, 1.0, 0.6, 2.0, 1.0, 0.9, 1.1, 1.0, 0.7, 1.3, 1.0],
        );
        let planner = WindowPlanner::new(PlannerConfig::default().with_coverage_tolerance_pct(10.0));
        let plan = planner.plan(&table, 4.0, 2.0).unwrap();

        assert_eq!(plan.len(), 3);
        assert!(plan.len() <= table.len());
        for window in plan.windows() {
            assert!(window.end > window.start);
        }
    }

    #[test]
    fn descending_centres_still_advance_in_key_order() {
        let centers: Vec<_> = (1..=10).map(|i| 10.0 - i as f64).collect();
        let table = table(&centers, &[1.0; 10]);
        let plan = WindowPlanner::default().plan(&table, 3.0, 2.0).unwrap();

        let spans: Vec<_> = plan
            .windows()
            .map(|w| (w.start.clone(), w.end.clone()))
            .collect();
        assert_eq!(
            spans,
            [(1, 3), (3, 5), (5, 7), (7, 9)]
                .map(|(a, b)| (SliceKey::Instance(a), SliceKey::Instance(b)))
                .to_vec()
        );
        for entry in plan.entries() {
            assert!(entry.window.end > entry.window.start);
            assert!(entry.step.to > entry.step.from);
            assert_eq!(entry.window.coverage, 3.0);
        }
    }

    #[test]
    fn stepping_onto_the_last_slice_reports_no_candidate() {
        let table = table(&[0.0, 5.0, 10.0, 15.0, 20.0], &[5.0; 5]);
        let err = WindowPlanner::default().plan(&table, 15.0, 10.0).unwrap_err();
        assert_eq!(
            err,
            PlanError::NoCandidate {
                start: SliceKey::Instance(5)
            }
        );
    }

    #[test]
    fn single_slice_has_no_window() {
        let table = uniform(1, 1.0, 1.0);
        assert!(matches!(
            WindowPlanner::default().plan(&table, 1.0, 1.0),
            Err(PlanError::NoCandidate { .. })
        ));
    }

    #[test]
    fn start_outside_table_is_reported() {
        let table = uniform(3, 1.0, 1.0);
        assert_eq!(
            WindowPlanner::default().window_from(&table, 3, 1.0).unwrap_err(),
            PlanError::StartOutOfRange(3)
        );
    }

    #[test]
    fn non_positive_targets_are_rejected() {
        let table = uniform(5, 1.0, 1.0);
        let planner = WindowPlanner::default();
        assert_eq!(
            planner.plan(&table, 0.0, 1.0).unwrap_err(),
            PlanError::InvalidTarget {
                name: "window_coverage",
                value: 0.0
            }
        );
        assert!(matches!(
            planner.plan(&table, 2.0, f64::NAN),
            Err(PlanError::InvalidTarget { name: "step_size", .. })
        ));
    }
}
