use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::detection::domain::detection_error::{CreationError, ProcessingError};
use crate::detection::domain::detector_config::{DetectorConfig, Settings};
use crate::detection::domain::detector_factory::DetectorFactory;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

use super::cascade_detector::{CascadeDetector, CascadeSettings};
use super::onnx_ssd_detector::{NetworkSettings, OnnxSsdDetector};

/// Closed set of detector discriminators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// `"haar"`: Haar cascade.
    Cascade,
    /// `"ssd"`: single-shot network exported as an ONNX graph. Descriptions
    /// typed `"caffe"` are rejected; Caffe prototxt/caffemodel pairs must be
    /// converted to ONNX and retyped.
    Network,
}

impl DetectorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectorKind::Cascade => "haar",
            DetectorKind::Network => "ssd",
        }
    }
}

impl FromStr for DetectorKind {
    type Err = CreationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "haar" => Ok(DetectorKind::Cascade),
            "ssd" => Ok(DetectorKind::Network),
            other => Err(CreationError::UnknownType(other.to_owned())),
        }
    }
}

/// A constructed detector of one of the known kinds.
pub enum Detector {
    Cascade(CascadeDetector),
    Network(OnnxSsdDetector),
}

impl Detector {
    pub fn kind(&self) -> DetectorKind {
        match self {
            Detector::Cascade(_) => DetectorKind::Cascade,
            Detector::Network(_) => DetectorKind::Network,
        }
    }
}

impl ObjectDetector for Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, ProcessingError> {
        match self {
            Detector::Cascade(d) => d.detect(frame),
            Detector::Network(d) => d.detect(frame),
        }
    }
}

/// Builds detectors from descriptions, resolving resource paths against a
/// working directory (the process working directory by default).
#[derive(Clone, Debug, Default)]
pub struct ConfiguredDetectorFactory {
    working_dir: PathBuf,
}

impl ConfiguredDetectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// Validates the whole description before loading anything.
    pub fn create_detector(&self, config: &DetectorConfig) -> Result<Detector, CreationError> {
        match config.kind().parse::<DetectorKind>()? {
            DetectorKind::Cascade => {
                let settings =
                    CascadeSettings::from_config(config.settings(), &self.working_dir)?;
                Ok(Detector::Cascade(CascadeDetector::new(settings)?))
            }
            DetectorKind::Network => {
                let settings =
                    NetworkSettings::from_config(config.settings(), &self.working_dir)?;
                Ok(Detector::Network(OnnxSsdDetector::new(settings)?))
            }
        }
    }
}

impl DetectorFactory for ConfiguredDetectorFactory {
    fn create(&self, config: &DetectorConfig) -> Result<Box<dyn ObjectDetector>, CreationError> {
        let detector = self.create_detector(config)?;
        log::debug!("Created {} detector", detector.kind().as_str());
        Ok(Box::new(detector))
    }
}

// ---------------------------------------------------------------------------
// Settings helpers shared by the detector kinds
// ---------------------------------------------------------------------------

/// Resolves `name` against `working_dir` and requires a regular file there.
pub(crate) fn existing_resource(
    working_dir: &Path,
    name: &str,
    resource: &'static str,
) -> Result<PathBuf, CreationError> {
    let path = working_dir.join(name);
    if !path.is_file() {
        return Err(CreationError::ResourceNotFound { resource, path });
    }
    Ok(path)
}

pub(crate) fn non_negative(settings: &Settings, key: &str) -> Result<u32, CreationError> {
    let value = settings.integer(key)?;
    u32::try_from(value).map_err(|_| CreationError::InvalidValue {
        key: settings.key_path(key),
        reason: format!("{value} is not a non-negative 32-bit integer"),
    })
}

/// Reads `{ "width": int, "height": int }`.
pub(crate) fn object_size(settings: &Settings, key: &str) -> Result<(u32, u32), CreationError> {
    let size = settings.object(key)?;
    Ok((non_negative(&size, "width")?, non_negative(&size, "height")?))
}
