use crate::detection::domain::detection_error::ProcessingError;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Domain interface for object detection on a single image.
///
/// Detectors wrap non-reentrant model state, hence `&mut self`: each worker
/// owns a private instance instead of sharing one behind a lock. Returned
/// rects are in the coordinate space of `frame` and may overlap.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, ProcessingError>;
}
