use std::path::Path;

use crate::detection::domain::detection_error::ProcessingError;
use crate::shared::frame::Frame;

/// Decodes a single image file into a [`Frame`].
///
/// Shared by all workers, so implementations must be stateless or
/// internally synchronized.
pub trait ImageReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Frame, ProcessingError>;
}
