use std::path::Path;

use crate::detection::domain::detection_error::ProcessingError;
use crate::imaging::domain::image_reader::ImageReader;
use crate::shared::frame::Frame;

/// Decodes image files with the `image` crate into 3-channel RGB frames.
///
/// The format is guessed from the file content, so a misnamed file still
/// decodes and a corrupt one fails regardless of its extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl ImageReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<Frame, ProcessingError> {
        let decode_error = |reason: String| ProcessingError::Decode {
            path: path.to_path_buf(),
            reason,
        };
        let image = image::ImageReader::open(path)
            .map_err(|e| decode_error(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| decode_error(e.to_string()))?
            .decode()
            .map_err(|e| decode_error(e.to_string()))?;

        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(ProcessingError::EmptyImage);
        }
        Ok(Frame::new(rgb.into_raw(), width, height, 3))
    }
}
