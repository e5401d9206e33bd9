/// Cascade-based object detector.
///
/// Converts to grayscale, downsamples by `1 / scale_factor`, equalizes the
/// histogram, scans with a Haar cascade and maps the rectangles back to the
/// source image.
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::contrast::equalize_histogram;

use crate::detection::domain::detection_error::{CreationError, ProcessingError};
use crate::detection::domain::detector_config::Settings;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

use super::configured_detector_factory::{existing_resource, non_negative, object_size};
use super::haar_cascade::{HaarCascade, MultiScaleParams};

const CASCADE_RESOURCE: &str = "haar cascade file";

/// Validated settings of a `"haar"` description.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeSettings {
    pub cascade_path: PathBuf,
    pub neighbors_number: u32,
    pub scale_factor: f64,
    pub min_object_size: (u32, u32),
    /// `0` on either axis means unbounded.
    pub max_object_size: (u32, u32),
}

impl CascadeSettings {
    /// Reads and checks every key, then checks that the cascade file exists.
    pub fn from_config(settings: &Settings, working_dir: &Path) -> Result<Self, CreationError> {
        let cascade_file_name = settings.string("cascade_file_name")?;
        let neighbors_number = non_negative(settings, "neighbors_number")?;
        let scale_factor = settings.float("scale_factor")?;
        if scale_factor <= 1.0 {
            return Err(CreationError::InvalidValue {
                key: settings.key_path("scale_factor"),
                reason: format!("{scale_factor} must be greater than 1.0"),
            });
        }
        let min_object_size = object_size(settings, "min_object_size")?;
        let max_object_size = object_size(settings, "max_object_size")?;
        let cascade_path = existing_resource(working_dir, cascade_file_name, CASCADE_RESOURCE)?;

        Ok(Self {
            cascade_path,
            neighbors_number,
            scale_factor,
            min_object_size,
            max_object_size,
        })
    }
}

pub struct CascadeDetector {
    cascade: HaarCascade,
    settings: CascadeSettings,
}

impl CascadeDetector {
    pub fn new(settings: CascadeSettings) -> Result<Self, CreationError> {
        let cascade =
            HaarCascade::load(&settings.cascade_path).map_err(|e| CreationError::LoadFailed {
                resource: CASCADE_RESOURCE,
                path: settings.cascade_path.clone(),
                reason: e.to_string(),
            })?;
        log::debug!(
            "Loaded cascade {} ({} stages, window {:?})",
            settings.cascade_path.display(),
            cascade.stage_count(),
            cascade.window_size()
        );
        Ok(Self { cascade, settings })
    }

    fn params(&self) -> MultiScaleParams {
        MultiScaleParams {
            scale_factor: self.settings.scale_factor,
            min_neighbors: self.settings.neighbors_number,
            min_size: self.settings.min_object_size,
            max_size: self.settings.max_object_size,
        }
    }
}

impl ObjectDetector for CascadeDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, ProcessingError> {
        if frame.is_empty() {
            return Err(ProcessingError::EmptyImage);
        }
        let gray = to_gray(frame)?;

        let factor = self.settings.scale_factor;
        let small_w = ((gray.width() as f64 / factor) as u32).max(1);
        let small_h = ((gray.height() as f64 / factor) as u32).max(1);
        let small = imageops::resize(&gray, small_w, small_h, FilterType::Triangle);
        let equalized = equalize_histogram(&small);

        Ok(self
            .cascade
            .detect_multi_scale(&equalized, &self.params())
            .into_iter()
            .map(|r| r.scaled(factor))
            .collect())
    }
}

fn to_gray(frame: &Frame) -> Result<GrayImage, ProcessingError> {
    let (w, h) = (frame.width(), frame.height());
    let mismatch = || ProcessingError::Detection("frame buffer does not match its size".into());
    match frame.channels() {
        1 => GrayImage::from_raw(w, h, frame.data().to_vec()).ok_or_else(mismatch),
        3 => {
            let rgb = RgbImage::from_raw(w, h, frame.data().to_vec()).ok_or_else(mismatch)?;
            Ok(DynamicImage::ImageRgb8(rgb).to_luma8())
        }
        n => Err(ProcessingError::UnsupportedChannels(n)),
    }
}
