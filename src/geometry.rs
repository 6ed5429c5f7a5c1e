//! Scan-axis geometry of a slice stack.
//!
//! The scan axis is the normal of the imaging plane, derived from the row and
//! column cosines of the first slice. Projecting every ImagePositionPatient
//! onto it yields a 1-D coordinate; centres are measured from the slice with
//! the smallest coordinate. Planning walks the stack in ascending key order.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use crate::enums::{SliceKey, SortBy};
use crate::slice::SliceRecord;

/// Minimum norm of `row × column` for the orientation to be usable.
const DEGENERATE_NORM: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("No slices to resolve")]
    EmptyStack,

    #[error("Scan axis cannot be derived from the slice orientation")]
    UnresolvableGeometry,

    #[error("SliceThickness missing in all slices")]
    MissingThickness,

    #[error("Duplicate slice key {0}")]
    DuplicateKey(SliceKey),
}

/// Location of one slice along the scan axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub key: SliceKey,
    /// Signed distance from the first slice centre in mm.
    pub rel_center: f64,
    /// Slice thickness in mm.
    pub thickness: f64,
}

/// Positions of a stack in ascending key order.
#[derive(Debug, Clone, Default)]
pub struct PositionTable {
    positions: Vec<Position>,
    index: HashMap<SliceKey, usize>,
}

impl PositionTable {
    /// Build a table, sorting `positions` by key.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DuplicateKey`] if two positions share a key
    pub fn new(mut positions: Vec<Position>) -> Result<Self, GeometryError> {
        positions.sort_by(|a, b| a.key.cmp(&b.key));
        let mut index = HashMap::with_capacity(positions.len());
        for (i, position) in positions.iter().enumerate() {
            if index.insert(position.key.clone(), i).is_some() {
                return Err(GeometryError::DuplicateKey(position.key.clone()));
            }
        }
        Ok(Self { positions, index })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, key: &SliceKey) -> Option<&Position> {
        self.index_of(key).map(|i| &self.positions[i])
    }

    pub fn index_of(&self, key: &SliceKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Position at an index in key order
    pub fn at(&self, index: usize) -> Option<&Position> {
        self.positions.get(index)
    }

    pub fn first(&self) -> Option<&Position> {
        self.positions.first()
    }

    pub fn last(&self) -> Option<&Position> {
        self.positions.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SliceKey> {
        self.positions.iter().map(|position| &position.key)
    }

    pub fn as_slice(&self) -> &[Position] {
        &self.positions
    }
}

/// Outcome of resolving a stack.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Positions along the scan axis, in key order.
    Positioned(PositionTable),
    /// Metadata order only. Positions are unavailable.
    Fallback(Vec<SliceKey>),
}

impl Resolution {
    pub fn sort_by(&self) -> SortBy {
        match self {
            Resolution::Positioned(_) => SortBy::ScanAxis,
            Resolution::Fallback(_) => SortBy::Fallback,
        }
    }

    /// Slice keys in the resolved order
    pub fn order(&self) -> Vec<SliceKey> {
        match self {
            Resolution::Positioned(table) => table.keys().cloned().collect(),
            Resolution::Fallback(keys) => keys.clone(),
        }
    }

    /// Positions for planning; the fallback order cannot be planned against.
    pub fn into_positions(self) -> Result<PositionTable, GeometryError> {
        match self {
            Resolution::Positioned(table) => Ok(table),
            Resolution::Fallback(_) => Err(GeometryError::UnresolvableGeometry),
        }
    }
}

pub struct SliceGeometryResolver;

impl SliceGeometryResolver {
    /// Order a stack along its scan axis and measure every slice
    ///
    /// Falls back to a metadata order when the orientation or any position is
    /// unusable.
    ///
    /// # Errors
    ///
    /// Returns error if the stack is empty, a key is duplicated or thickness
    /// is missing from every slice
    pub fn resolve(slices: &[SliceRecord]) -> Result<Resolution, GeometryError> {
        if slices.is_empty() {
            return Err(GeometryError::EmptyStack);
        }

        let Some(normal) = Self::scan_axis(&slices[0]) else {
            warn!("slice orientation unusable, falling back to metadata order");
            return Self::fallback_order(slices).map(Resolution::Fallback);
        };

        let Some(scalars) = Self::project(slices, normal) else {
            warn!("slice position missing, falling back to metadata order");
            return Self::fallback_order(slices).map(Resolution::Fallback);
        };

        let mut order: Vec<usize> = (0..slices.len()).collect();
        order.sort_by(|&a, &b| scalars[a].total_cmp(&scalars[b]));

        let thickness = Self::resolve_thickness(order.iter().map(|&i| slices[i].thickness))?;

        let origin = scalars[order[0]];
        let positions: Vec<_> = order
            .iter()
            .zip(thickness)
            .map(|(&i, thickness)| Position {
                key: slices[i].key(),
                rel_center: scalars[i] - origin,
                thickness,
            })
            .collect();

        if positions.windows(2).any(|pair| pair[0].key > pair[1].key) {
            warn!("slice keys are not ascending along the scan axis, planning in key order");
        }

        debug!(
            "resolved {} slices over {:.3} mm",
            positions.len(),
            scalars[order[order.len() - 1]] - origin
        );

        PositionTable::new(positions).map(Resolution::Positioned)
    }

    /// Unit normal of the imaging plane of `slice`
    pub fn scan_axis(slice: &SliceRecord) -> Option<[f64; 3]> {
        let orientation = slice.orientation?;
        if orientation.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let row = [orientation[0], orientation[1], orientation[2]];
        let column = [orientation[3], orientation[4], orientation[5]];
        let normal = cross(row, column);
        let norm = dot(normal, normal).sqrt();
        if norm < DEGENERATE_NORM {
            return None;
        }

        Some(normal.map(|v| v / norm))
    }

    fn project(slices: &[SliceRecord], normal: [f64; 3]) -> Option<Vec<f64>> {
        slices
            .iter()
            .map(|slice| {
                let position = slice.position?;
                let scalar = dot(position, normal);
                scalar.is_finite().then_some(scalar)
            })
            .collect()
    }

    /// Substitute missing thickness with the median of the known ones
    fn resolve_thickness(
        values: impl Iterator<Item = Option<f64>>,
    ) -> Result<Vec<f64>, GeometryError> {
        let values: Vec<_> = values
            .map(|value| value.filter(|t| t.is_finite() && *t >= 0.0))
            .collect();

        let mut known: Vec<f64> = values.iter().flatten().copied().collect();
        if known.is_empty() {
            return Err(GeometryError::MissingThickness);
        }

        let missing = values.len() - known.len();
        let median = median(&mut known);
        if missing > 0 {
            warn!("SliceThickness missing in {missing} slices, using median {median:.3} mm");
        }

        Ok(values.into_iter().map(|t| t.unwrap_or(median)).collect())
    }

    /// InstanceNumber first, then AcquisitionTime or SOP Instance UID
    fn fallback_order(slices: &[SliceRecord]) -> Result<Vec<SliceKey>, GeometryError> {
        let mut sorted: Vec<&SliceRecord> = slices.iter().collect();
        sorted.sort_by(|a, b| Self::fallback_rank(a).cmp(&Self::fallback_rank(b)));

        let keys: Vec<_> = sorted.iter().map(|slice| slice.key()).collect();
        let mut seen = HashSet::with_capacity(keys.len());
        if let Some(duplicate) = keys.iter().find(|key| !seen.insert(*key)) {
            return Err(GeometryError::DuplicateKey(duplicate.clone()));
        }

        Ok(keys)
    }

    fn fallback_rank(slice: &SliceRecord) -> (u8, i32, &str) {
        match slice.instance_number {
            Some(number) => (0, number, ""),
            None => {
                let time = slice
                    .acquisition_time
                    .as_deref()
                    .filter(|time| !time.is_empty());
                (1, 0, time.unwrap_or(&slice.sop_instance_uid))
            }
        }
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0].mul_add(b[0], a[1].mul_add(b[1], a[2] * b[2]))
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
