/// Single-shot face detector using ONNX Runtime via `ort`.
///
/// The input is the image scaled so its longest side equals the configured
/// size, edge-replicated to a square and fed as NCHW float32 BGR in
/// `[0, 255]`. The output is the classic SSD detection table
/// `[image_id, label, confidence, x1, y1, x2, y2]` with normalized corners.
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};

use crate::detection::domain::detection_error::{CreationError, ProcessingError};
use crate::detection::domain::detector_config::Settings;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

use super::configured_detector_factory::existing_resource;

const STRUCTURE_RESOURCE: &str = "network structure file";
const WEIGHTS_RESOURCE: &str = "network weights file";

/// Values per row of the detection table.
const DETECTION_ROW_LEN: usize = 7;

/// Class label of a face; labels are compared with this tolerance.
const FACE_LABEL: f32 = 1.0;
const LABEL_TOLERANCE: f32 = 0.03;

/// Validated settings of an `"ssd"` description.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkSettings {
    pub structure_path: PathBuf,
    /// External tensor data of the structure file. The bytes are always read
    /// from this path and registered under its file name, which must match
    /// the external-data location recorded in the graph.
    pub weights_path: PathBuf,
    pub target_image_size: u32,
    pub confidence_level: f64,
}

impl NetworkSettings {
    pub fn from_config(settings: &Settings, working_dir: &Path) -> Result<Self, CreationError> {
        let structure_name = settings.string("network_structure_file")?;
        let weights_name = settings.string("weights_file_name")?;

        let target_image_size = settings.integer("target_image_size")?;
        let target_image_size = u32::try_from(target_image_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| CreationError::InvalidValue {
                key: settings.key_path("target_image_size"),
                reason: format!("{target_image_size} must be a positive size"),
            })?;

        let confidence_level = settings.float("confidence_level")?;
        if !(0.0..=1.0).contains(&confidence_level) {
            return Err(CreationError::InvalidValue {
                key: settings.key_path("confidence_level"),
                reason: format!("{confidence_level} is outside [0, 1]"),
            });
        }

        let structure_path = existing_resource(working_dir, structure_name, STRUCTURE_RESOURCE)?;
        let weights_path = existing_resource(working_dir, weights_name, WEIGHTS_RESOURCE)?;

        Ok(Self {
            structure_path,
            weights_path,
            target_image_size,
            confidence_level,
        })
    }

    /// Name the graph uses for its external data, with the bytes to serve for it.
    fn external_data(&self) -> Result<(PathBuf, Vec<u8>), CreationError> {
        let name = self
            .weights_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.weights_path.clone());
        let bytes = read_resource(&self.weights_path, WEIGHTS_RESOURCE)?;
        Ok((name, bytes))
    }
}

fn read_resource(path: &Path, resource: &'static str) -> Result<Vec<u8>, CreationError> {
    fs::read(path).map_err(|e| CreationError::LoadFailed {
        resource,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub struct OnnxSsdDetector {
    session: ort::session::Session,
    target_image_size: u32,
    confidence_level: f64,
}

impl OnnxSsdDetector {
    /// Builds the session from the structure bytes, serving the configured
    /// weights file as the graph's external data.
    pub fn new(settings: NetworkSettings) -> Result<Self, CreationError> {
        let structure = read_resource(&settings.structure_path, STRUCTURE_RESOURCE)?;
        let (weights_name, weights) = settings.external_data()?;

        let load_failed = |e: ort::Error| CreationError::LoadFailed {
            resource: STRUCTURE_RESOURCE,
            path: settings.structure_path.clone(),
            reason: e.to_string(),
        };
        let session = ort::session::Session::builder()
            .map_err(load_failed)?
            .with_external_initializer_file_in_memory(&weights_name, Cow::Owned(weights))
            .map_err(|e| load_failed(e.into()))?
            .commit_from_memory(&structure)
            .map_err(load_failed)?;

        log::debug!(
            "Loaded network {} (weights {})",
            settings.structure_path.display(),
            settings.weights_path.display()
        );

        Ok(Self {
            session,
            target_image_size: settings.target_image_size,
            confidence_level: settings.confidence_level,
        })
    }
}

impl ObjectDetector for OnnxSsdDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, ProcessingError> {
        if frame.is_empty() {
            return Err(ProcessingError::EmptyImage);
        }
        let rgb = to_rgb(frame)?;
        let input = square_input(&rgb, self.target_image_size);

        let inference = |e: ort::Error| ProcessingError::Detection(e.to_string());
        let input_value = ort::value::Tensor::from_array(input).map_err(inference)?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(inference)?;
        if outputs.len() == 0 {
            return Err(ProcessingError::Detection(
                "network produced no outputs".into(),
            ));
        }
        let tensor = outputs[0].try_extract_array::<f32>().map_err(inference)?;
        let data = tensor.as_slice().ok_or_else(|| {
            ProcessingError::Detection("network output is not contiguous".into())
        })?;
        if data.len() % DETECTION_ROW_LEN != 0 {
            return Err(ProcessingError::Detection(format!(
                "unexpected output shape {:?}",
                tensor.shape()
            )));
        }

        Ok(decode_detections(
            data,
            self.confidence_level,
            frame.width(),
            frame.height(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

fn to_rgb(frame: &Frame) -> Result<RgbImage, ProcessingError> {
    let (w, h) = (frame.width(), frame.height());
    let mismatch = || ProcessingError::Detection("frame buffer does not match its size".into());
    match frame.channels() {
        3 => RgbImage::from_raw(w, h, frame.data().to_vec()).ok_or_else(mismatch),
        1 => {
            let gray = GrayImage::from_raw(w, h, frame.data().to_vec()).ok_or_else(mismatch)?;
            Ok(DynamicImage::ImageLuma8(gray).to_rgb8())
        }
        n => Err(ProcessingError::UnsupportedChannels(n)),
    }
}

/// Scales the longest side to `target_size`, replicates the last row and
/// column out to a square, and lays the result out as NCHW BGR.
fn square_input(image: &RgbImage, target_size: u32) -> ndarray::Array4<f32> {
    let longest = image.width().max(image.height()) as f64;
    let scale = target_size as f64 / longest;
    let new_w = ((image.width() as f64 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((image.height() as f64 * scale).round() as u32).clamp(1, target_size);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let size = target_size as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        let sy = (y as u32).min(new_h - 1);
        for x in 0..size {
            let sx = (x as u32).min(new_w - 1);
            let pixel = resized.get_pixel(sx, sy).0;
            for c in 0..3 {
                tensor[[0, c, y, x]] = pixel[2 - c] as f32;
            }
        }
    }
    tensor
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// Turns detection rows into face rectangles in original image coordinates.
///
/// Corners are normalized to the padded square, whose side maps to the
/// image's longest side. Boxes are clamped to the image; degenerate boxes are
/// dropped.
fn decode_detections(data: &[f32], confidence_level: f64, width: u32, height: u32) -> Vec<Rect> {
    let side = width.max(height) as f64;
    let (w, h) = (width as f64, height as f64);

    data.chunks_exact(DETECTION_ROW_LEN)
        .filter(|row| (row[1] - FACE_LABEL).abs() <= LABEL_TOLERANCE)
        .filter(|row| row[2] as f64 >= confidence_level)
        .filter_map(|row| {
            let x1 = (row[3] as f64 * side).clamp(0.0, w);
            let y1 = (row[4] as f64 * side).clamp(0.0, h);
            let x2 = (row[5] as f64 * side).clamp(0.0, w);
            let y2 = (row[6] as f64 * side).clamp(0.0, h);
            let rect = Rect::from_corners(x1, y1, x2, y2);
            (rect.width > 0 && rect.height > 0).then_some(rect)
        })
        .collect()
}
