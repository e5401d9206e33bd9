use crate::detection::domain::detection_error::CreationError;
use crate::detection::domain::detector_config::DetectorConfig;
use crate::detection::domain::object_detector::ObjectDetector;

/// Builds independent detector instances from a parsed description.
///
/// Implementations validate the whole description before constructing
/// anything and never hand back a partially-built detector. The processor
/// calls `create` once per worker.
pub trait DetectorFactory: Send + Sync {
    fn create(&self, config: &DetectorConfig) -> Result<Box<dyn ObjectDetector>, CreationError>;
}
