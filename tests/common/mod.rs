use dicom_window_planner::SliceRecord;

pub const AXIAL: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// Axial stack with the given slice centres (z, mm) and thicknesses,
/// numbered from 1 and listed in reverse to exercise sorting.
pub fn axial_stack(centers: &[f64], thickness: &[Option<f64>]) -> Vec<SliceRecord> {
    centers
        .iter()
        .zip(thickness)
        .enumerate()
        .rev()
        .map(|(i, (&z, &thickness))| {
            let mut record = SliceRecord::new(format!("1.3.6.1.4.1.9590.{}", i + 1))
                .with_instance_number(i as i32 + 1)
                .with_series("1.3.6.1.4.1.9590.100")
                .with_image_type(["ORIGINAL", "PRIMARY", "AXIAL"])
                .with_orientation(AXIAL)
                .with_position([-175.0, -175.0, -300.0 + z]);
            record.thickness = thickness;
            record
        })
        .collect()
}

pub fn uniform_stack(count: usize, spacing: f64, thickness: f64) -> Vec<SliceRecord> {
    let centers: Vec<_> = (0..count).map(|i| i as f64 * spacing).collect();
    axial_stack(&centers, &vec![Some(thickness); count])
}
