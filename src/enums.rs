use std::fmt;

use serde::{Serialize, Serializer};

/// Identifies a slice inside a series.
///
/// Slices are keyed by their InstanceNumber when present and by their
/// SOP Instance UID otherwise. Every ordinal key sorts before every
/// identifier key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SliceKey {
    Instance(i32),
    Sop(String),
}

impl fmt::Display for SliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceKey::Instance(number) => write!(f, "{number}"),
            SliceKey::Sop(uid) => write!(f, "SOP:{uid}"),
        }
    }
}

impl Serialize for SliceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SliceKey::Instance(number) => serializer.serialize_i32(*number),
            SliceKey::Sop(_) => serializer.collect_str(self),
        }
    }
}

/// How a slice order was obtained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Projection of ImagePositionPatient onto the scan-axis normal.
    #[default]
    ScanAxis,
    /// InstanceNumber, then AcquisitionTime, then SOP Instance UID.
    /// No positions are available in this mode.
    Fallback,
}

/// The three quantities a plan is scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKey {
    TotalCoverage,
    WindowCoverage,
    StepSize,
}

impl TargetKey {
    pub const ALL: [TargetKey; 3] = [
        TargetKey::TotalCoverage,
        TargetKey::WindowCoverage,
        TargetKey::StepSize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetKey::TotalCoverage => "total_coverage",
            TargetKey::WindowCoverage => "window_coverage",
            TargetKey::StepSize => "step_size",
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_keys_sort_before_identifier_keys() {
        let mut keys = vec![
            SliceKey::Sop("1.2.3".into()),
            SliceKey::Instance(7),
            SliceKey::Instance(-2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                SliceKey::Instance(-2),
                SliceKey::Instance(7),
                SliceKey::Sop("1.2.3".into()),
            ]
        );
    }

    #[test]
    fn keys_serialize_as_number_or_prefixed_uid() {
        let json = serde_json::to_string(&[SliceKey::Instance(4), SliceKey::Sop("9.8".into())])
            .expect("keys serialize");
        assert_eq!(json, r#"[4,"SOP:9.8"]"#);
    }
}
