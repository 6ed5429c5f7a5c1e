use crate::slice::SliceRecord;

use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use log::{debug, warn};
use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SliceLoaderError {
    #[error("No valid DICOM slices found")]
    NoValidSlices,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Reads slice metadata from DICOM objects.
///
/// Pixel data is never decoded: files are parsed up to the PixelData element
/// and only header attributes are kept.
pub struct SliceLoader;

impl SliceLoader {
    /// Extract slice records from DICOM objects
    ///
    /// Objects without a SOP Instance UID are skipped. The result is filtered
    /// down to the primary series with [`SliceLoader::select_primary_series`].
    ///
    /// # Errors
    ///
    /// Returns error if no object yields a slice record
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Result<Vec<SliceRecord>, SliceLoaderError> {
        let records: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::record_from_dicom_object(dicom_object))
            .collect();

        if records.is_empty() {
            return Err(SliceLoaderError::NoValidSlices);
        }

        Ok(Self::select_primary_series(records))
    }

    /// Load slice records from file paths, reading headers in parallel
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
    ) -> Result<Vec<SliceRecord>, SliceLoaderError> {
        let objects: Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| {
                OpenFileOptions::new()
                    .read_until(tags::PIXEL_DATA)
                    .open_file(path.as_ref())
            })
            .collect();

        Self::load_from_dicom_objects(&objects?)
    }

    /// Load slice records from every file of a series directory
    pub fn load_from_directory(path: impl AsRef<Path>) -> Result<Vec<SliceRecord>, SliceLoaderError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();

        if paths.is_empty() {
            return Err(SliceLoaderError::NoValidSlices);
        }

        // read_dir order is platform dependent; the first record picks the series
        paths.sort();
        debug!(
            "reading {} files from {}",
            paths.len(),
            path.as_ref().display()
        );

        Self::load_from_file_paths(&paths)
    }

    /// Build a [`SliceRecord`] from the header of a single DICOM object
    pub fn record_from_dicom_object(dicom_object: &InMemDicomObject) -> Option<SliceRecord> {
        let sop_instance_uid = Self::get_string(dicom_object, tags::SOP_INSTANCE_UID)?;

        let orientation = Self::get_floats(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)
            .and_then(|values| <[f64; 6]>::try_from(values).ok());
        let position = Self::get_floats(dicom_object, tags::IMAGE_POSITION_PATIENT)
            .and_then(|values| <[f64; 3]>::try_from(values).ok());
        let thickness = dicom_object
            .element(tags::SLICE_THICKNESS)
            .ok()
            .and_then(|element| element.to_float64().ok());
        let instance_number = dicom_object
            .element(tags::INSTANCE_NUMBER)
            .ok()
            .and_then(|element| element.to_int::<i32>().ok());
        let image_type = Self::get_string(dicom_object, tags::IMAGE_TYPE)
            .map(|value| value.split('\\').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Some(SliceRecord {
            instance_number,
            sop_instance_uid,
            acquisition_time: Self::get_string(dicom_object, tags::ACQUISITION_TIME),
            series_instance_uid: Self::get_string(dicom_object, tags::SERIES_INSTANCE_UID),
            image_type,
            orientation,
            position,
            thickness,
        })
    }

    /// Keep the image slices of the first record's series
    ///
    /// Records from other series, records without ImageType and localizers
    /// are dropped. When nothing survives the filter, the input is returned
    /// unchanged.
    pub fn select_primary_series(records: Vec<SliceRecord>) -> Vec<SliceRecord> {
        let Some(series) = records.first().map(|record| record.series_instance_uid.clone()) else {
            return records;
        };

        let selected: Vec<_> = records
            .iter()
            .filter(|record| {
                record.series_instance_uid == series
                    && !record.image_type.is_empty()
                    && !record.is_localizer()
            })
            .cloned()
            .collect();

        if selected.is_empty() {
            warn!(
                "no image slices left after series filtering, keeping all {} records",
                records.len()
            );
            return records;
        }

        debug!("selected {}/{} slices", selected.len(), records.len());
        selected
    }

    fn get_string(dicom_object: &InMemDicomObject, tag: dicom::core::Tag) -> Option<String> {
        let value = dicom_object.element(tag).ok()?.to_str().ok()?;
        let value = value.trim_end_matches(['\0', ' ']).trim_start();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn get_floats(dicom_object: &InMemDicomObject, tag: dicom::core::Tag) -> Option<Vec<f64>> {
        dicom_object.element(tag).ok()?.to_multi_float64().ok()
    }
}
