use crate::enums::SliceKey;

/// Per-slice metadata as read from a DICOM header.
///
/// Only the attributes needed to order a stack and measure it along the scan
/// axis are kept. Records are never mutated after loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceRecord {
    pub instance_number: Option<i32>,
    pub sop_instance_uid: String,
    pub acquisition_time: Option<String>,
    pub series_instance_uid: Option<String>,
    pub image_type: Vec<String>,
    /// ImageOrientationPatient: row cosines followed by column cosines.
    pub orientation: Option<[f64; 6]>,
    /// ImagePositionPatient in mm.
    pub position: Option<[f64; 3]>,
    /// SliceThickness in mm.
    pub thickness: Option<f64>,
}

impl SliceRecord {
    pub fn new(sop_instance_uid: impl Into<String>) -> Self {
        Self {
            sop_instance_uid: sop_instance_uid.into(),
            ..Default::default()
        }
    }

    pub fn with_instance_number(mut self, instance_number: i32) -> Self {
        self.instance_number = Some(instance_number);
        self
    }

    pub fn with_acquisition_time(mut self, time: impl Into<String>) -> Self {
        self.acquisition_time = Some(time.into());
        self
    }

    pub fn with_series(mut self, series_instance_uid: impl Into<String>) -> Self {
        self.series_instance_uid = Some(series_instance_uid.into());
        self
    }

    pub fn with_image_type<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_type = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_orientation(mut self, orientation: [f64; 6]) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_thickness(mut self, thickness: f64) -> Self {
        self.thickness = Some(thickness);
        self
    }

    /// Key of this slice: the ordinal when present, the UID otherwise.
    pub fn key(&self) -> SliceKey {
        match self.instance_number {
            Some(number) => SliceKey::Instance(number),
            None => SliceKey::Sop(self.sop_instance_uid.clone()),
        }
    }

    pub fn is_localizer(&self) -> bool {
        self.image_type
            .iter()
            .any(|value| value.trim().eq_ignore_ascii_case("LOCALIZER"))
    }
}
